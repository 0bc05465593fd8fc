use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Language {
    English,
    #[default]
    Spanish,
    French,
    German,
    Italian,
    Portuguese,
    Chinese,
    Japanese,
    Korean,
    Russian,
    Arabic,
    Hindi,
    Dutch,
    Turkish,
    Vietnamese,
    Thai,
    Greek,
    Swedish,
}

pub const LANGUAGES: [Language; 18] = [
    Language::English,
    Language::Spanish,
    Language::French,
    Language::German,
    Language::Italian,
    Language::Portuguese,
    Language::Chinese,
    Language::Japanese,
    Language::Korean,
    Language::Russian,
    Language::Arabic,
    Language::Hindi,
    Language::Dutch,
    Language::Turkish,
    Language::Vietnamese,
    Language::Thai,
    Language::Greek,
    Language::Swedish,
];

impl Language {
    pub const fn name(self) -> &'static str {
        match self {
            Self::English => "English",
            Self::Spanish => "Spanish",
            Self::French => "French",
            Self::German => "German",
            Self::Italian => "Italian",
            Self::Portuguese => "Portuguese",
            Self::Chinese => "Chinese",
            Self::Japanese => "Japanese",
            Self::Korean => "Korean",
            Self::Russian => "Russian",
            Self::Arabic => "Arabic",
            Self::Hindi => "Hindi",
            Self::Dutch => "Dutch",
            Self::Turkish => "Turkish",
            Self::Vietnamese => "Vietnamese",
            Self::Thai => "Thai",
            Self::Greek => "Greek",
            Self::Swedish => "Swedish",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct UnknownOption(pub String);

impl fmt::Display for UnknownOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unsupported option: {:?}", self.0)
    }
}

impl std::error::Error for UnknownOption {}

impl FromStr for Language {
    type Err = UnknownOption;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();

        LANGUAGES
            .into_iter()
            .find(|language| language.name().eq_ignore_ascii_case(name))
            .ok_or_else(|| UnknownOption(s.into()))
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tone {
    #[default]
    Neutral,
    Creative,
    Formal,
    Academic,
    Casual,
}

pub const TONES: [Tone; 5] =
    [Tone::Neutral, Tone::Creative, Tone::Formal, Tone::Academic, Tone::Casual];

impl Tone {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Neutral => "Neutral",
            Self::Creative => "Creative",
            Self::Formal => "Formal",
            Self::Academic => "Academic",
            Self::Casual => "Casual",
        }
    }
}

impl fmt::Display for Tone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Tone {
    type Err = UnknownOption;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();

        TONES
            .into_iter()
            .find(|tone| tone.name().eq_ignore_ascii_case(name))
            .ok_or_else(|| UnknownOption(s.into()))
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TranslationOptions {
    pub target_language: Language,
    pub tone: Tone,
    /// Free-form notes about the manuscript, such as audience or setting.
    pub context: String,
}

impl TranslationOptions {
    pub fn new(target_language: Language) -> Self {
        Self { target_language, ..Self::default() }
    }
}

/// One submission, captured from the workspace at the moment it was made.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TranslationRequest {
    pub source_text: String,
    pub options: TranslationOptions,
}
