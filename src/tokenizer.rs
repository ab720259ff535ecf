//! Relative tokenizer: symbols become small integers in first-seen order.
//!
//! A tokenizer instance owns its token map. Codes are only meaningful to the
//! instance that produced them: feeding one instance's codes to another
//! instance's [`RelativeTokenizer::detokenize`] is a caller error that goes
//! undetected (unmapped codes simply come back as the placeholder). Build one
//! tokenizer per translation unit and drop it when the unit completes.

use std::collections::HashMap;

use serde::Deserialize;

/// Reserved end-of-pattern symbol, always code 0.
pub const EOP: &str = "<EOP>";
pub const EOP_CODE: u32 = 0;
pub const DEFAULT_UNKNOWN_PLACEHOLDER: &str = "[unclear]";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    /// Split on single spaces, join with single spaces.
    #[default]
    Word,
    /// One symbol per `char`, joined without separator.
    #[serde(alias = "character")]
    Char,
}

#[derive(Clone, Debug)]
pub struct RelativeTokenizer {
    granularity: Granularity,
    symbol_to_code: HashMap<String, u32>,
    code_to_symbol: HashMap<u32, String>,
    next_code: u32,
    placeholder: String,
}

impl Default for RelativeTokenizer {
    fn default() -> Self {
        Self::new(Granularity::Word)
    }
}

impl RelativeTokenizer {
    #[must_use]
    pub fn new(granularity: Granularity) -> Self {
        Self {
            granularity,
            symbol_to_code: HashMap::new(),
            code_to_symbol: HashMap::new(),
            next_code: 1,
            placeholder: DEFAULT_UNKNOWN_PLACEHOLDER.to_string(),
        }
    }

    #[must_use]
    pub fn with_placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.placeholder = placeholder.into();
        self
    }

    #[must_use]
    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    /// Number of text symbols assigned so far (excludes the EOP marker).
    #[must_use]
    pub fn len(&self) -> usize {
        self.symbol_to_code.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.symbol_to_code.is_empty()
    }

    #[must_use]
    pub fn code_of(&self, symbol: &str) -> Option<u32> {
        self.symbol_to_code.get(symbol).copied()
    }

    #[must_use]
    pub fn symbol_of(&self, code: u32) -> Option<&str> {
        if code == EOP_CODE {
            return Some(EOP);
        }
        self.code_to_symbol.get(&code).map(String::as_str)
    }

    pub fn tokenize(&mut self, text: &str) -> Vec<u32> {
        match self.granularity {
            Granularity::Word => text.split(' ').map(|w| self.intern(w)).collect(),
            Granularity::Char => {
                let mut buf = [0u8; 4];
                text.chars()
                    .map(|c| {
                        let s: &str = c.encode_utf8(&mut buf);
                        self.intern(s)
                    })
                    .collect()
            }
        }
    }

    /// Inverse of [`tokenize`](Self::tokenize). Codes this instance never
    /// assigned become the placeholder symbol.
    #[must_use]
    pub fn detokenize(&self, codes: &[u32]) -> String {
        let symbols = codes
            .iter()
            .map(|&c| self.symbol_of(c).unwrap_or(self.placeholder.as_str()));
        match self.granularity {
            Granularity::Word => symbols.collect::<Vec<_>>().join(" "),
            Granularity::Char => symbols.collect(),
        }
    }

    fn intern(&mut self, symbol: &str) -> u32 {
        if let Some(&code) = self.symbol_to_code.get(symbol) {
            return code;
        }
        let code = self.next_code;
        self.next_code += 1;
        self.symbol_to_code.insert(symbol.to_string(), code);
        self.code_to_symbol.insert(code, symbol.to_string());
        code
    }
}

/// Space-separated rendering used in prompts.
#[must_use]
pub fn render_codes(codes: &[u32]) -> String {
    codes
        .iter()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}
