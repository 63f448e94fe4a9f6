use crate::record::{FieldNames, Record};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    FullSuccess,
    MissingFlag,
    MissingSetMember,
    MissingBoth,
}

impl Outcome {
    pub const ALL: [Outcome; 4] = [
        Outcome::FullSuccess,
        Outcome::MissingFlag,
        Outcome::MissingSetMember,
        Outcome::MissingBoth,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::FullSuccess => "full_success",
            Outcome::MissingFlag => "missing_flag",
            Outcome::MissingSetMember => "missing_set_member",
            Outcome::MissingBoth => "missing_both",
        }
    }

    pub fn is_loss(self) -> bool {
        self != Outcome::FullSuccess
    }

    pub fn missing_fields<'a>(self, fields: &'a FieldNames) -> Vec<&'a str> {
        match self {
            Outcome::FullSuccess => Vec::new(),
            Outcome::MissingFlag => vec![fields.flag.as_str()],
            Outcome::MissingSetMember => vec![fields.set.as_str()],
            Outcome::MissingBoth => vec![fields.flag.as_str(), fields.set.as_str()],
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classifies a fetched document against both expected partial effects.
///
/// Total over every document shape: an absent record, an absent field, or a
/// field of the wrong type all count as that effect being lost.
pub fn classify(
    record: Option<&Record>,
    fields: &FieldNames,
    expected_flag: bool,
    expected_member: &str,
) -> Outcome {
    let Some(record) = record else {
        return Outcome::MissingBoth;
    };
    let has_flag = record.bool_field(&fields.flag) == Some(expected_flag);
    let has_member = record.set_contains(&fields.set, expected_member);
    match (has_flag, has_member) {
        (true, true) => Outcome::FullSuccess,
        (false, true) => Outcome::MissingFlag,
        (true, false) => Outcome::MissingSetMember,
        (false, false) => Outcome::MissingBoth,
    }
}
