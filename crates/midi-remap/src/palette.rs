use crate::gm::DRUM_KIT;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Instrument role a channel is assigned to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Lead,
    Pad,
    Bass,
    Percussion,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lead => "lead",
            Self::Pad => "pad",
            Self::Bass => "bass",
            Self::Percussion => "percussion",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Allowed programs for one console style, bucketed by role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Palette {
    leads: Vec<u8>,
    pads: Vec<u8>,
    basses: Vec<u8>,
    /// The style's own percussive melodic program (not the drum kit).
    percussion: u8,
}

impl Palette {
    pub fn new(leads: Vec<u8>, pads: Vec<u8>, basses: Vec<u8>, percussion: u8) -> crate::Result<Self> {
        for (name, bucket) in [("leads", &leads), ("pads", &pads), ("basses", &basses)] {
            if bucket.is_empty() {
                return Err(crate::Error::InvalidPalette(format!("{name} bucket is empty")));
            }
            if let Some(p) = bucket.iter().find(|&&p| p > 127) {
                return Err(crate::Error::InvalidPalette(format!(
                    "{name} bucket has program {p} outside 0..=127"
                )));
            }
        }
        if percussion > 127 {
            return Err(crate::Error::InvalidPalette(format!(
                "percussion program {percussion} outside 0..=127"
            )));
        }

        Ok(Self {
            leads,
            pads,
            basses,
            percussion,
        })
    }

    pub fn leads(&self) -> &[u8] {
        &self.leads
    }

    pub fn pads(&self) -> &[u8] {
        &self.pads
    }

    pub fn basses(&self) -> &[u8] {
        &self.basses
    }

    pub fn percussion(&self) -> u8 {
        self.percussion
    }

    /// Program list for a melodic role. Percussion has no bucket.
    pub fn bucket(&self, role: Role) -> Option<&[u8]> {
        match role {
            Role::Lead => Some(&self.leads),
            Role::Pad => Some(&self.pads),
            Role::Bass => Some(&self.basses),
            Role::Percussion => None,
        }
    }

    /// Round-robin pick within a role's bucket, keyed by channel.
    pub fn pick(&self, role: Role, channel: u8) -> u8 {
        match self.bucket(role) {
            Some(bucket) => bucket[channel as usize % bucket.len()],
            None => DRUM_KIT,
        }
    }

    /// Every program this style may play, sorted, including the drum kit.
    pub fn allowed_programs(&self) -> Vec<u8> {
        let mut all: Vec<u8> = self
            .leads
            .iter()
            .chain(&self.pads)
            .chain(&self.basses)
            .copied()
            .chain([self.percussion, DRUM_KIT])
            .collect();
        all.sort_unstable();
        all.dedup();
        all
    }

    pub fn allows(&self, program: u8) -> bool {
        self.allowed_programs().contains(&program)
    }
}

/// Style id to palette.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Catalogue {
    styles: BTreeMap<String, Palette>,
}

impl Catalogue {
    /// The five console styles shipped with the tool.
    pub fn builtin() -> Self {
        let mut catalogue = Self::default();
        for (id, leads, pads, basses, percussion) in BUILTIN_STYLES {
            catalogue.styles.insert(
                id.to_string(),
                Palette {
                    leads: leads.to_vec(),
                    pads: pads.to_vec(),
                    basses: basses.to_vec(),
                    percussion: *percussion,
                },
            );
        }
        catalogue
    }

    /// Add or replace a style.
    pub fn insert(&mut self, style: &str, palette: Palette) {
        self.styles.insert(normalize_style(style), palette);
    }

    pub fn palette(&self, style: &str) -> crate::Result<&Palette> {
        let key = normalize_style(style);
        self.styles.get(&key).ok_or_else(|| crate::Error::UnknownStyle {
            style: key,
            valid: self.style_ids().join(", "),
        })
    }

    pub fn style_ids(&self) -> Vec<String> {
        self.styles.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Palette)> {
        self.styles.iter().map(|(k, v)| (k.as_str(), v))
    }
}

fn normalize_style(style: &str) -> String {
    style.trim().to_lowercase()
}

type StyleRow = (&'static str, &'static [u8], &'static [u8], &'static [u8], u8);

const BUILTIN_STYLES: &[StyleRow] = &[
    (
        "snes",
        &[41, 56, 64, 68, 72, 73, 74, 75],
        &[42, 48, 49, 50, 51, 60],
        &[32, 43, 58, 70],
        47,
    ),
    (
        "gba",
        &[80, 81, 82, 83, 87, 88, 89, 90],
        &[92, 93, 94, 95, 98, 99],
        &[33, 34, 35, 36, 38, 39],
        0,
    ),
    (
        "nds",
        &[20, 21, 22, 24, 25, 26, 27, 28],
        &[4, 5, 6, 14, 15, 16, 17],
        &[32, 35, 39, 40],
        47,
    ),
    (
        "ps2",
        &[41, 56, 64, 73, 25, 26, 27, 81],
        &[48, 49, 50, 51, 60, 92, 93],
        &[32, 33, 43, 38],
        47,
    ),
    (
        "wii",
        &[41, 56, 64, 68, 70, 72, 73, 74],
        &[42, 48, 49, 50, 60, 61, 62],
        &[32, 43, 58, 70],
        47,
    ),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_has_five_styles() {
        let catalogue = Catalogue::builtin();
        assert_eq!(
            catalogue.style_ids(),
            vec!["gba", "nds", "ps2", "snes", "wii"]
        );
    }

    #[test]
    fn style_lookup_is_case_insensitive() {
        let catalogue = Catalogue::builtin();
        let snes = catalogue.palette("  SNES ").unwrap();
        assert_eq!(snes.leads()[0], 41);
    }

    #[test]
    fn unknown_style_lists_valid_ids() {
        let catalogue = Catalogue::builtin();
        let err = catalogue.palette("n64").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("n64"));
        assert!(message.contains("snes"));
    }

    #[test]
    fn allowed_programs_sorted_with_drum_kit() {
        let catalogue = Catalogue::builtin();
        let allowed = catalogue.palette("snes").unwrap().allowed_programs();
        assert_eq!(allowed.first(), Some(&32));
        assert_eq!(allowed.last(), Some(&DRUM_KIT));
        assert!(allowed.contains(&47));
        assert!(allowed.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn pick_is_round_robin() {
        let palette = Palette::new(vec![10, 11, 12], vec![20], vec![30, 31], 47).unwrap();
        assert_eq!(palette.pick(Role::Lead, 0), 10);
        assert_eq!(palette.pick(Role::Lead, 4), 11);
        assert_eq!(palette.pick(Role::Bass, 3), 31);
        assert_eq!(palette.pick(Role::Pad, 15), 20);
        assert_eq!(palette.pick(Role::Percussion, 2), DRUM_KIT);
    }

    #[test]
    fn empty_bucket_rejected() {
        let err = Palette::new(vec![], vec![1], vec![2], 47).unwrap_err();
        assert!(matches!(err, crate::Error::InvalidPalette(_)));
    }

    #[test]
    fn out_of_range_program_rejected() {
        assert!(Palette::new(vec![128], vec![1], vec![2], 47).is_err());
        assert!(Palette::new(vec![1], vec![1], vec![2], 200).is_err());
    }
}
