use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DispatchError;

/// The kinds of file a worker can be assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileType {
    QuartrBatch,
    QuartrLive,
    Hp,
    AieraBatch,
    AieraLive,
}

impl FileType {
    pub const ALL: [FileType; 5] = [
        FileType::QuartrBatch,
        FileType::QuartrLive,
        FileType::Hp,
        FileType::AieraBatch,
        FileType::AieraLive,
    ];

    pub fn name(self) -> &'static str {
        match self {
            FileType::QuartrBatch => "QUARTR BATCH FILE",
            FileType::QuartrLive => "QUARTR LIVE FILE",
            FileType::Hp => "HP FILE",
            FileType::AieraBatch => "AIERA BATCH FILE",
            FileType::AieraLive => "AIERA LIVE FILE",
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            FileType::QuartrBatch => "QB",
            FileType::QuartrLive => "QL",
            FileType::Hp => "HP",
            FileType::AieraBatch => "AB",
            FileType::AieraLive => "AL",
        }
    }

    /// HP files carry a flat turnaround regardless of audio length.
    pub fn is_fixed_duration(self) -> bool {
        matches!(self, FileType::Hp)
    }

    /// Maps a reaction to a file type. Accepts the short codes and the
    /// regional-indicator letters used by the reaction trigger.
    pub fn from_reaction(emoji: &str) -> Option<FileType> {
        match emoji {
            "🇶" => Some(FileType::QuartrBatch),
            "🇱" => Some(FileType::QuartrLive),
            "🇭" => Some(FileType::Hp),
            "🇦" => Some(FileType::AieraBatch),
            other => FileType::ALL.into_iter().find(|ft| ft.code() == other),
        }
    }
}

impl std::fmt::Display for FileType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FileType {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        FileType::ALL
            .into_iter()
            .find(|ft| {
                ft.name().eq_ignore_ascii_case(wanted) || ft.code().eq_ignore_ascii_case(wanted)
            })
            .or_else(|| FileType::from_reaction(wanted))
            .ok_or_else(|| DispatchError::UnknownFileType(s.to_string()))
    }
}
