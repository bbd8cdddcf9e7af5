//! Spoken command vocabulary
//!
//! Maps a free-form transcript to one [`Action`]. Matching is a plain
//! substring search over an ordered keyword table, so the order of the
//! table decides ties ("gerar uma esfera" is a sphere, not a render).

use serde::Deserialize;
use std::fmt;

use crate::config::ExtraKeywords;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Cube,
    Sphere,
    Front,
    Back,
    Left,
    Right,
    Up,
    Down,
    Render,
    Cylinder,
    Texture,
}

impl Action {
    /// Declaration order, which is also match priority
    pub const ALL: [Action; 11] = [
        Action::Cube,
        Action::Sphere,
        Action::Front,
        Action::Back,
        Action::Left,
        Action::Right,
        Action::Up,
        Action::Down,
        Action::Render,
        Action::Cylinder,
        Action::Texture,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Action::Cube => "cube",
            Action::Sphere => "sphere",
            Action::Front => "front",
            Action::Back => "back",
            Action::Left => "left",
            Action::Right => "right",
            Action::Up => "up",
            Action::Down => "down",
            Action::Render => "render",
            Action::Cylinder => "cylinder",
            Action::Texture => "texture",
        }
    }

    fn default_keywords(self) -> &'static [&'static str] {
        match self {
            Action::Cube => &["cubo", "cube", "cuba", "cobrir", "cobe"],
            Action::Sphere => &["sphere", "create sphere", "add sphere", "ball", "esfera"],
            Action::Front => &["front", "forward", "move front", "ahead", "frente"],
            Action::Back => &["back", "backward", "move back", "behind", "trás", "tras"],
            Action::Left => &["left", "move left", "to left", "esquerda"],
            Action::Right => &["right", "move right", "to right", "direita"],
            Action::Up => &["up", "move up", "rise", "sobe", "subir"],
            Action::Down => &["down", "move down", "lower", "desce", "descer"],
            Action::Render => &[
                "render",
                "rende",
                "renderizar",
                "gravar",
                "gerar imagem",
                "gerar",
                "trava",
                "travar",
            ],
            Action::Cylinder => &["cylinder", "cilindro", "cili", "cilindru", "cilin"],
            Action::Texture => &["texture", "textura", "smart", "testura"],
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Ordered keyword table
#[derive(Debug, Clone)]
pub struct Vocabulary {
    entries: Vec<(Action, Vec<String>)>,
}

impl Default for Vocabulary {
    fn default() -> Self {
        let entries = Action::ALL
            .iter()
            .map(|&action| {
                let keywords = action
                    .default_keywords()
                    .iter()
                    .map(|k| k.to_string())
                    .collect();
                (action, keywords)
            })
            .collect();
        Self { entries }
    }
}

impl Vocabulary {
    /// Default table with configured keywords appended; action order is kept
    pub fn with_extra(extra: &[ExtraKeywords]) -> Self {
        let mut vocabulary = Self::default();
        for group in extra {
            if let Some((_, keywords)) = vocabulary
                .entries
                .iter_mut()
                .find(|(action, _)| *action == group.action)
            {
                keywords.extend(
                    group
                        .keywords
                        .iter()
                        .map(|k| k.trim().to_lowercase())
                        .filter(|k| !k.is_empty()),
                );
            }
        }
        vocabulary
    }

    pub fn keywords(&self, action: Action) -> &[String] {
        self.entries
            .iter()
            .find(|(a, _)| *a == action)
            .map(|(_, k)| k.as_slice())
            .unwrap_or(&[])
    }

    /// All keywords, flattened; used as recognizer phrase hints
    pub fn phrases(&self) -> Vec<String> {
        self.entries
            .iter()
            .flat_map(|(_, keywords)| keywords.iter().cloned())
            .collect()
    }

    /// First action (in table order) with a keyword contained in the transcript
    pub fn resolve(&self, transcript: &str) -> Option<Action> {
        let text = transcript.trim().to_lowercase();
        if text.is_empty() {
            return None;
        }

        let found = self.entries.iter().find_map(|(action, keywords)| {
            keywords
                .iter()
                .any(|k| text.contains(k.as_str()))
                .then_some(*action)
        });

        if found.is_none() {
            tracing::info!(transcript = %text, "no command matched");
        }
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cube_in_sentence() {
        let v = Vocabulary::default();
        assert_eq!(v.resolve("quero um cubo por favor"), Some(Action::Cube));
    }

    #[test]
    fn test_no_match() {
        let v = Vocabulary::default();
        assert_eq!(v.resolve("xyz"), None);
        assert_eq!(v.resolve("   "), None);
    }

    #[test]
    fn test_case_and_whitespace_insensitive() {
        let v = Vocabulary::default();
        assert_eq!(v.resolve("  ESFERA  "), Some(Action::Sphere));
        assert_eq!(v.resolve("Renderizar"), Some(Action::Render));
    }

    #[test]
    fn test_table_order_breaks_ties() {
        let v = Vocabulary::default();
        // "gerar" is a render keyword, but sphere comes first
        assert_eq!(v.resolve("gerar uma esfera"), Some(Action::Sphere));
        // "left" before "up"
        assert_eq!(v.resolve("move left and up"), Some(Action::Left));
    }

    #[test]
    fn test_accented_keywords() {
        let v = Vocabulary::default();
        assert_eq!(v.resolve("para trás"), Some(Action::Back));
        assert_eq!(v.resolve("cilindro"), Some(Action::Cylinder));
        assert_eq!(v.resolve("aplicar textura"), Some(Action::Texture));
    }

    #[test]
    fn test_extra_keywords() {
        let extra = vec![ExtraKeywords {
            action: Action::Cylinder,
            keywords: vec!["  Tubo ".into(), "".into()],
        }];
        let v = Vocabulary::with_extra(&extra);
        assert_eq!(v.resolve("um tubo"), Some(Action::Cylinder));
        assert_eq!(v.keywords(Action::Cylinder).last().map(String::as_str), Some("tubo"));
        assert_eq!(v.keywords(Action::Cylinder).len(), 6);
    }

    #[test]
    fn test_phrases_cover_all_actions() {
        let v = Vocabulary::default();
        let phrases = v.phrases();
        for action in Action::ALL {
            assert!(phrases.contains(&action.default_keywords()[0].to_string()));
        }
    }
}
