use std::fmt::Write;

use serde_json::{Value, json};

use super::options::TranslationOptions;

pub const SYSTEM_INSTRUCTION: &str = concat!(
    "You are an expert literary translator working on manuscripts. ",
    "Preserve the author's meaning, voice, paragraph breaks and formatting. ",
    "Never summarize, censor or omit any part of the text."
);

const TEXT_ONLY_DIRECTIVE: &str = concat!(
    "Respond with only the translated text. ",
    "Do not include notes, explanations, the source language or any other metadata."
);

const STRUCTURED_DIRECTIVE: &str = concat!(
    "Detect the language of the source text. ",
    "If a word choice, idiom or cultural nuance deserves an explanation, ",
    "add brief translator's notes; otherwise leave them out."
);

fn instruction(source_text: &str, options: &TranslationOptions, directive: &str) -> String {
    let mut instruction = String::new();

    writeln!(instruction, "Translate the following text into {}.", options.target_language).ok();
    writeln!(instruction, "Tone: {}", options.tone).ok();
    writeln!(instruction, "Context: {}", options.context).ok();
    writeln!(instruction).ok();
    writeln!(instruction, "{directive}").ok();
    writeln!(instruction).ok();
    writeln!(instruction, "Text:").ok();
    instruction.push_str(source_text);

    instruction
}

/// Instruction for the streaming path, where the reply is the translation and nothing else.
pub fn stream_instruction(source_text: &str, options: &TranslationOptions) -> String {
    instruction(source_text, options, TEXT_ONLY_DIRECTIVE)
}

/// Instruction for the structured path; the shape of the reply is fixed by [`result_schema`].
pub fn structured_instruction(source_text: &str, options: &TranslationOptions) -> String {
    instruction(source_text, options, STRUCTURED_DIRECTIVE)
}

pub fn result_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "translatedText": { "type": "STRING" },
            "detectedLanguage": { "type": "STRING" },
            "translatorNotes": { "type": "STRING" }
        },
        "required": ["translatedText", "detectedLanguage"]
    })
}
