//! Filename grammar for modality data files.
//!
//! A grammar is an ordered list of entity rules plus the suffix/extension
//! pairs the modality accepts. Parsing is left to right over `_`-delimited
//! segments; the last segment is the suffix, the extension is everything from
//! the first `.`.

use prism_types::issue::IssueCode;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Entity {
    Subject,
    Session,
    Task,
    Acquisition,
    Run,
    Recording,
}

impl Entity {
    pub fn key(self) -> &'static str {
        match self {
            Entity::Subject => "sub",
            Entity::Session => "ses",
            Entity::Task => "task",
            Entity::Acquisition => "acq",
            Entity::Run => "run",
            Entity::Recording => "recording",
        }
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelPattern {
    Alphanumeric,
    Digits,
}

impl LabelPattern {
    pub fn matches(self, label: &str) -> bool {
        !label.is_empty()
            && match self {
                LabelPattern::Alphanumeric => label.chars().all(|c| c.is_ascii_alphanumeric()),
                LabelPattern::Digits => label.chars().all(|c| c.is_ascii_digit()),
            }
    }

    fn placeholder(self) -> &'static str {
        match self {
            LabelPattern::Alphanumeric => "<label>",
            LabelPattern::Digits => "<index>",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EntityRule {
    pub entity: Entity,
    pub required: bool,
    pub pattern: LabelPattern,
}

const fn rule(entity: Entity, required: bool, pattern: LabelPattern) -> EntityRule {
    EntityRule {
        entity,
        required,
        pattern,
    }
}

const SUB: EntityRule = rule(Entity::Subject, true, LabelPattern::Alphanumeric);
const SES: EntityRule = rule(Entity::Session, false, LabelPattern::Alphanumeric);
const TASK: EntityRule = rule(Entity::Task, true, LabelPattern::Alphanumeric);
const ACQ: EntityRule = rule(Entity::Acquisition, false, LabelPattern::Alphanumeric);
const RUN: EntityRule = rule(Entity::Run, false, LabelPattern::Digits);
const RECORDING: EntityRule = rule(Entity::Recording, false, LabelPattern::Alphanumeric);

#[derive(Debug)]
pub struct ModalityGrammar {
    pub modality: &'static str,
    pub entities: &'static [EntityRule],
    /// `(suffix, extensions)`; extensions longest first.
    pub suffixes: &'static [(&'static str, &'static [&'static str])],
}

impl ModalityGrammar {
    /// Human-readable pattern, e.g.
    /// `sub-<label>[_ses-<label>]_task-<label>[_run-<index>]_survey.tsv`.
    pub fn expected_pattern(&self) -> String {
        let mut out = String::new();
        for (i, r) in self.entities.iter().enumerate() {
            let sep = if i == 0 { "" } else { "_" };
            let seg = format!("{}{}-{}", sep, r.entity.key(), r.pattern.placeholder());
            if r.required {
                out.push_str(&seg);
            } else {
                out.push_str(&format!("[{}]", seg));
            }
        }
        for (i, (suffix, exts)) in self.suffixes.iter().enumerate() {
            if i > 0 {
                out.push('|');
            }
            let exts: Vec<&str> = exts.iter().map(|e| e.trim_start_matches('.')).collect();
            if exts.len() == 1 {
                out.push_str(&format!("_{}.{}", suffix, exts[0]));
            } else {
                out.push_str(&format!("_{}.<{}>", suffix, exts.join("|")));
            }
        }
        out
    }

    fn rule(&self, key: &str) -> Option<(usize, &EntityRule)> {
        self.entities
            .iter()
            .enumerate()
            .find(|(_, r)| r.entity.key() == key)
    }
}

static GRAMMARS: &[ModalityGrammar] = &[
    ModalityGrammar {
        modality: "survey",
        entities: &[SUB, SES, TASK, RUN],
        suffixes: &[("survey", &[".tsv"])],
    },
    ModalityGrammar {
        modality: "biometrics",
        entities: &[SUB, SES, TASK, RUN],
        suffixes: &[("biometrics", &[".tsv"])],
    },
    ModalityGrammar {
        modality: "physio",
        entities: &[SUB, SES, TASK, ACQ, RUN, RECORDING],
        suffixes: &[("physio", &[".tsv.gz", ".tsv", ".edf"])],
    },
    ModalityGrammar {
        modality: "eyetracking",
        entities: &[SUB, SES, TASK, ACQ, RUN],
        suffixes: &[("eyetrack", &[".tsv.gz", ".tsv", ".edf", ".asc"])],
    },
];

pub fn grammar_for(modality: &str) -> Option<&'static ModalityGrammar> {
    GRAMMARS.iter().find(|g| g.modality == modality)
}

pub fn known_modalities() -> impl Iterator<Item = &'static str> {
    GRAMMARS.iter().map(|g| g.modality)
}

/// A successfully parsed data filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityMatch {
    pub modality: String,
    /// Entities in grammar order.
    pub entities: Vec<(Entity, String)>,
    pub suffix: String,
    /// Including the leading dot.
    pub extension: String,
    pub raw: String,
}

impl EntityMatch {
    pub fn get(&self, entity: Entity) -> Option<&str> {
        self.entities
            .iter()
            .find(|(e, _)| *e == entity)
            .map(|(_, v)| v.as_str())
    }

    pub fn subject(&self) -> Option<&str> {
        self.get(Entity::Subject)
    }

    pub fn session(&self) -> Option<&str> {
        self.get(Entity::Session)
    }

    pub fn task(&self) -> Option<&str> {
        self.get(Entity::Task)
    }

    /// Filename stem (everything before the extension).
    pub fn stem(&self) -> String {
        stem_of(&self.entities, &self.suffix)
    }

    /// Stem built from the listed entities only, in grammar order.
    pub fn stem_with(&self, keep: &[Entity]) -> String {
        let kept: Vec<(Entity, String)> = self
            .entities
            .iter()
            .filter(|(e, _)| keep.contains(e))
            .cloned()
            .collect();
        stem_of(&kept, &self.suffix)
    }
}

fn stem_of(entities: &[(Entity, String)], suffix: &str) -> String {
    let mut out = String::new();
    for (entity, label) in entities {
        out.push_str(entity.key());
        out.push('-');
        out.push_str(label);
        out.push('_');
    }
    out.push_str(suffix);
    out
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("no filename grammar for modality '{0}'")]
    UnknownModality(String),

    #[error("malformed filename '{filename}': {reason}; expected {expected}")]
    Malformed {
        filename: String,
        reason: String,
        expected: String,
    },

    #[error("invalid {entity} label '{label}' in '{filename}': expected {pattern}")]
    InvalidLabel {
        filename: String,
        entity: Entity,
        label: String,
        pattern: &'static str,
    },

    #[error("unsupported '{suffix}{extension}' for {modality} in '{filename}': expected {expected}")]
    UnsupportedSuffix {
        filename: String,
        modality: String,
        suffix: String,
        extension: String,
        expected: String,
    },
}

impl ParseError {
    pub fn code(&self) -> IssueCode {
        match self {
            ParseError::UnknownModality(_) => IssueCode::UnknownModality,
            ParseError::Malformed { .. } => IssueCode::MalformedFilename,
            ParseError::InvalidLabel { .. } => IssueCode::InvalidEntityLabel,
            ParseError::UnsupportedSuffix { .. } => IssueCode::UnsupportedSuffix,
        }
    }
}

pub fn parse(filename: &str, modality: &str) -> Result<EntityMatch, ParseError> {
    let grammar =
        grammar_for(modality).ok_or_else(|| ParseError::UnknownModality(modality.to_string()))?;
    let malformed = |reason: String| ParseError::Malformed {
        filename: filename.to_string(),
        reason,
        expected: grammar.expected_pattern(),
    };

    let Some(dot) = filename.find('.') else {
        return Err(malformed("missing extension".to_string()));
    };
    let (stem, extension) = filename.split_at(dot);

    let mut segments: Vec<&str> = stem.split('_').collect();
    let suffix = segments.pop().unwrap_or_default();
    if suffix.is_empty() || suffix.contains('-') {
        return Err(malformed("missing suffix".to_string()));
    }

    let mut entities: Vec<(Entity, String)> = Vec::new();
    let mut next = 0usize;
    for (i, seg) in segments.iter().enumerate() {
        let Some((key, label)) = seg.split_once('-') else {
            return Err(malformed(format!("segment '{seg}' is not key-value")));
        };
        let key = key.to_ascii_lowercase();
        match grammar.rule(&key) {
            None => {
                let unknown: Vec<&str> = segments[i..]
                    .iter()
                    .copied()
                    .filter(|s| {
                        s.split_once('-')
                            .is_none_or(|(k, _)| grammar.rule(&k.to_ascii_lowercase()).is_none())
                    })
                    .collect();
                return Err(malformed(format!(
                    "unknown segment(s) {}",
                    unknown
                        .iter()
                        .map(|s| format!("'{s}'"))
                        .collect::<Vec<_>>()
                        .join(", ")
                )));
            }
            Some((pos, r)) if pos < next => {
                let reason = if entities.iter().any(|(e, _)| *e == r.entity) {
                    format!("duplicated entity '{key}'")
                } else {
                    format!("entity '{key}' out of order")
                };
                return Err(malformed(reason));
            }
            Some((pos, r)) => {
                if let Some(missing) = grammar.entities[next..pos].iter().find(|r| r.required) {
                    return Err(malformed(format!(
                        "required entity '{}' missing",
                        missing.entity
                    )));
                }
                if label.is_empty() {
                    return Err(malformed(format!("entity '{key}' has an empty label")));
                }
                entities.push((r.entity, label.to_string()));
                next = pos + 1;
            }
        }
    }
    if let Some(missing) = grammar.entities[next..].iter().find(|r| r.required) {
        return Err(malformed(format!(
            "required entity '{}' missing",
            missing.entity
        )));
    }

    let accepted = grammar
        .suffixes
        .iter()
        .any(|(s, exts)| *s == suffix && exts.contains(&extension));
    if !accepted {
        return Err(ParseError::UnsupportedSuffix {
            filename: filename.to_string(),
            modality: modality.to_string(),
            suffix: suffix.to_string(),
            extension: extension.to_string(),
            expected: grammar.expected_pattern(),
        });
    }

    for (entity, label) in &entities {
        let Some((_, r)) = grammar.rule(entity.key()) else {
            continue;
        };
        if !r.pattern.matches(label) {
            return Err(ParseError::InvalidLabel {
                filename: filename.to_string(),
                entity: *entity,
                label: label.clone(),
                pattern: match r.pattern {
                    LabelPattern::Alphanumeric => "letters and digits",
                    LabelPattern::Digits => "digits",
                },
            });
        }
    }

    Ok(EntityMatch {
        modality: modality.to_string(),
        entities,
        suffix: suffix.to_string(),
        extension: extension.to_string(),
        raw: filename.to_string(),
    })
}

pub fn canonicalize(m: &EntityMatch) -> String {
    format!("{}{}", m.stem(), m.extension)
}
