//! Speaker label normalization

use serde::{Deserialize, Serialize};

/// A show host recognized by a lowercase first-name key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Host {
    pub key: String,
    pub display_name: String,
}

impl Host {
    pub fn new(key: &str, display_name: &str) -> Self {
        Self {
            key: key.to_lowercase(),
            display_name: display_name.to_string(),
        }
    }

    /// "fraser", "Fraser" and "fraser kelton" all match key `fraser`.
    fn matches(&self, lowered_label: &str) -> bool {
        let key = self.key.to_lowercase();
        lowered_label == key
            || lowered_label
                .strip_prefix(key.as_str())
                .map_or(false, |rest| rest.starts_with(char::is_whitespace))
    }
}

/// The known hosts of a show. The first host is the primary one and is the
/// speaker assumed before any label has been seen.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeakerRoster {
    pub hosts: Vec<Host>,
}

impl Default for SpeakerRoster {
    fn default() -> Self {
        Self {
            hosts: vec![Host::new("fraser", "Fraser"), Host::new("nabeel", "Nabeel")],
        }
    }
}

impl SpeakerRoster {
    pub fn primary(&self) -> String {
        self.hosts
            .first()
            .map(|h| h.display_name.clone())
            .unwrap_or_else(|| "Unknown".to_string())
    }

    /// Map a raw label to its display name: known hosts to their canonical
    /// name, anyone else title-cased as a guest.
    pub fn normalize(&self, label: &str) -> String {
        let lowered = label.trim().to_lowercase();
        self.hosts
            .iter()
            .find(|h| h.matches(&lowered))
            .map(|h| h.display_name.clone())
            .unwrap_or_else(|| title_case(label))
    }
}

pub fn title_case(name: &str) -> String {
    name.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_variants_normalize_to_canonical_name() {
        let roster = SpeakerRoster::default();
        assert_eq!(roster.normalize("fraser"), "Fraser");
        assert_eq!(roster.normalize("Fraser"), "Fraser");
        assert_eq!(roster.normalize("fraser kelton"), "Fraser");
        assert_eq!(roster.normalize("NABEEL Hyatt"), "Nabeel");
    }

    #[test]
    fn test_unknown_label_is_title_cased() {
        let roster = SpeakerRoster::default();
        assert_eq!(roster.normalize("jordan"), "Jordan");
        assert_eq!(roster.normalize("jane DOE"), "Jane Doe");
    }

    #[test]
    fn test_prefix_without_word_boundary_is_a_guest() {
        let roster = SpeakerRoster::default();
        assert_eq!(roster.normalize("frasers"), "Frasers");
    }

    #[test]
    fn test_primary_host_defaults() {
        assert_eq!(SpeakerRoster::default().primary(), "Fraser");
        assert_eq!(SpeakerRoster { hosts: vec![] }.primary(), "Unknown");
    }
}
