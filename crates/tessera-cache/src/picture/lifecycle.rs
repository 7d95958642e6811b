// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use serde::{Deserialize, Serialize};

/// Application lifecycle signals the picture cache reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AppLifecycle {
    /// The app is in the foreground again; background warming resumes.
    Resumed,
    /// The app lost focus; background work is suspended.
    Inactive,
    /// The app is in the background; background work is suspended.
    Paused,
    /// The host view is gone; every tier is cleared.
    Detached,
    /// The view is hidden; treated as memory pressure.
    Hidden,
}

impl AppLifecycle {
    /// Parses a lowercase signal name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "resumed" => Some(Self::Resumed),
            "inactive" => Some(Self::Inactive),
            "paused" => Some(Self::Paused),
            "detached" => Some(Self::Detached),
            "hidden" => Some(Self::Hidden),
            _ => None,
        }
    }

    /// Whether background work (warming) should pause under this signal.
    pub fn suspends_background_work(self) -> bool {
        matches!(self, Self::Inactive | Self::Paused | Self::Detached)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_name() {
        assert_eq!(AppLifecycle::from_name("paused"), Some(AppLifecycle::Paused));
        assert_eq!(AppLifecycle::from_name("Paused"), None);
    }

    #[test]
    fn test_suspension() {
        assert!(AppLifecycle::Paused.suspends_background_work());
        assert!(AppLifecycle::Inactive.suspends_background_work());
        assert!(!AppLifecycle::Resumed.suspends_background_work());
        assert!(!AppLifecycle::Hidden.suspends_background_work());
    }
}
