//! ANSI SGR decoding into styled text tokens, memoized per input string.
//!
//! The running style set behaves like a stack: each code pushes a style or
//! removes exactly the styles its reset code cancels, so `\x1b[22m` drops
//! dim but keeps an active color.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;

const ESC: char = '\x1b';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Effect {
    Bold,
    Dim,
    Italic,
    Underline,
    Blink,
    RapidBlink,
    Inverse,
    Hidden,
    Strikethrough,
}

impl Effect {
    fn from_code(code: u16) -> Option<Self> {
        Some(match code {
            1 => Effect::Bold,
            2 => Effect::Dim,
            3 => Effect::Italic,
            4 => Effect::Underline,
            5 => Effect::Blink,
            6 => Effect::RapidBlink,
            7 => Effect::Inverse,
            8 => Effect::Hidden,
            9 => Effect::Strikethrough,
            _ => return None,
        })
    }

    fn class_name(&self) -> &'static str {
        match self {
            Effect::Bold => "bold",
            Effect::Dim => "dim",
            Effect::Italic => "italic",
            Effect::Underline => "underline",
            Effect::Blink => "blink",
            Effect::RapidBlink => "rapid-blink",
            Effect::Inverse => "inverse",
            Effect::Hidden => "hidden",
            Effect::Strikethrough => "strikethrough",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnsiColor {
    Black,
    Red,
    Green,
    Yellow,
    Blue,
    Magenta,
    Cyan,
    White,
    BrightBlack,
    BrightRed,
    BrightGreen,
    BrightYellow,
    BrightBlue,
    BrightMagenta,
    BrightCyan,
    BrightWhite,
}

impl AnsiColor {
    const STANDARD: [AnsiColor; 8] = [
        AnsiColor::Black,
        AnsiColor::Red,
        AnsiColor::Green,
        AnsiColor::Yellow,
        AnsiColor::Blue,
        AnsiColor::Magenta,
        AnsiColor::Cyan,
        AnsiColor::White,
    ];

    const BRIGHT: [AnsiColor; 8] = [
        AnsiColor::BrightBlack,
        AnsiColor::BrightRed,
        AnsiColor::BrightGreen,
        AnsiColor::BrightYellow,
        AnsiColor::BrightBlue,
        AnsiColor::BrightMagenta,
        AnsiColor::BrightCyan,
        AnsiColor::BrightWhite,
    ];

    fn name(&self) -> &'static str {
        match self {
            AnsiColor::Black => "black",
            AnsiColor::Red => "red",
            AnsiColor::Green => "green",
            AnsiColor::Yellow => "yellow",
            AnsiColor::Blue => "blue",
            AnsiColor::Magenta => "magenta",
            AnsiColor::Cyan => "cyan",
            AnsiColor::White => "white",
            AnsiColor::BrightBlack => "bright-black",
            AnsiColor::BrightRed => "bright-red",
            AnsiColor::BrightGreen => "bright-green",
            AnsiColor::BrightYellow => "bright-yellow",
            AnsiColor::BrightBlue => "bright-blue",
            AnsiColor::BrightMagenta => "bright-magenta",
            AnsiColor::BrightCyan => "bright-cyan",
            AnsiColor::BrightWhite => "bright-white",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnsiStyle {
    Effect(Effect),
    Foreground(AnsiColor),
    Background(AnsiColor),
}

impl AnsiStyle {
    pub fn class_name(&self) -> String {
        match self {
            AnsiStyle::Effect(effect) => effect.class_name().to_string(),
            AnsiStyle::Foreground(color) => format!("text-{}", color.name()),
            AnsiStyle::Background(color) => format!("bg-{}", color.name()),
        }
    }
}

impl fmt::Display for AnsiStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.class_name())
    }
}

/// A run of text sharing the same active styles
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnsiToken {
    pub text: String,
    pub styles: Vec<AnsiStyle>,
}

impl AnsiToken {
    pub fn is_plain(&self) -> bool {
        self.styles.is_empty()
    }

    pub fn class_names(&self) -> Vec<String> {
        self.styles.iter().map(AnsiStyle::class_name).collect()
    }
}

/// Apply one SGR parameter to the active style stack
fn apply_code(active: &mut Vec<AnsiStyle>, code: u16) {
    match code {
        0 => active.clear(),
        1..=9 => {
            if let Some(effect) = Effect::from_code(code) {
                if !active.contains(&AnsiStyle::Effect(effect)) {
                    active.push(AnsiStyle::Effect(effect));
                }
            }
        }
        21..=29 => {
            if let Some(effect) = Effect::from_code(code - 20) {
                active.retain(|style| *style != AnsiStyle::Effect(effect));
            }
        }
        30..=37 | 90..=97 => {
            let color = if code < 90 {
                AnsiColor::STANDARD[(code - 30) as usize]
            } else {
                AnsiColor::BRIGHT[(code - 90) as usize]
            };
            active.retain(|style| !matches!(style, AnsiStyle::Foreground(_)));
            active.push(AnsiStyle::Foreground(color));
        }
        40..=47 | 100..=107 => {
            let color = if code < 100 {
                AnsiColor::STANDARD[(code - 40) as usize]
            } else {
                AnsiColor::BRIGHT[(code - 100) as usize]
            };
            active.retain(|style| !matches!(style, AnsiStyle::Background(_)));
            active.push(AnsiStyle::Background(color));
        }
        39 => active.retain(|style| !matches!(style, AnsiStyle::Foreground(_))),
        49 => active.retain(|style| !matches!(style, AnsiStyle::Background(_))),
        _ => {}
    }
}

fn push_token(tokens: &mut Vec<AnsiToken>, text: &mut String, active: &[AnsiStyle]) {
    if text.is_empty() {
        return;
    }
    tokens.push(AnsiToken {
        text: std::mem::take(text),
        styles: active.to_vec(),
    });
}

/// Decode without caching
pub fn parse_ansi(input: &str) -> Vec<AnsiToken> {
    let mut tokens = Vec::new();
    let mut active: Vec<AnsiStyle> = Vec::new();
    let mut text = String::new();
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != ESC {
            text.push(ch);
            continue;
        }
        if chars.peek() != Some(&'[') {
            // Lone ESC or a non-CSI sequence: drop the escape byte
            continue;
        }
        chars.next();

        let mut params = String::new();
        let mut terminator = None;
        for next in chars.by_ref() {
            if ('\u{40}'..='\u{7e}').contains(&next) {
                terminator = Some(next);
                break;
            }
            params.push(next);
        }

        if terminator != Some('m') {
            continue;
        }

        push_token(&mut tokens, &mut text, &active);
        if params.is_empty() {
            active.clear();
            continue;
        }
        for param in params.split(';') {
            // Empty parameters count as 0 (`\x1b[;1m`)
            let code = if param.is_empty() { Some(0) } else { param.parse::<u16>().ok() };
            if let Some(code) = code {
                apply_code(&mut active, code);
            }
        }
    }

    push_token(&mut tokens, &mut text, &active);
    tokens
}

/// Strip every ANSI escape sequence, keeping the text
pub fn strip_ansi(content: &str) -> String {
    strip_ansi_escapes::strip_str(content).to_string()
}

/// Memoizing decoder. Messages are re-rendered constantly while the list
/// scrolls, so decoded tokens are cached by input with FIFO eviction.
pub struct AnsiDecoder {
    cache: HashMap<String, Arc<[AnsiToken]>>,
    order: VecDeque<String>,
    max_size: usize,
    hits: u64,
    misses: u64,
}

impl AnsiDecoder {
    pub fn new(max_size: usize) -> Self {
        Self {
            cache: HashMap::new(),
            order: VecDeque::new(),
            max_size: max_size.max(1),
            hits: 0,
            misses: 0,
        }
    }

    pub fn decode(&mut self, input: &str) -> Arc<[AnsiToken]> {
        if let Some(tokens) = self.cache.get(input) {
            self.hits += 1;
            return Arc::clone(tokens);
        }

        self.misses += 1;

        while self.cache.len() >= self.max_size {
            match self.order.pop_front() {
                Some(oldest) => {
                    self.cache.remove(&oldest);
                }
                None => break,
            }
        }

        let tokens: Arc<[AnsiToken]> = parse_ansi(input).into();
        self.cache.insert(input.to_string(), Arc::clone(&tokens));
        self.order.push_back(input.to_string());
        tokens
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn clear(&mut self) {
        self.cache.clear();
        self.order.clear();
    }
}

impl Default for AnsiDecoder {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classes(token: &AnsiToken) -> Vec<String> {
        token.class_names()
    }

    #[test]
    fn test_plain_text_is_single_plain_token() {
        let tokens = parse_ansi("hello world");
        assert_eq!(tokens.len(), 1);
        assert!(tokens[0].is_plain());
        assert_eq!(tokens[0].text, "hello world");
    }

    #[test]
    fn test_combined_codes_in_one_sequence() {
        let tokens = parse_ansi("\x1b[1;9;30;43mText\x1b[0mPlain");
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0].text, "Text");
        assert_eq!(
            classes(&tokens[0]),
            vec!["bold", "strikethrough", "text-black", "bg-yellow"]
        );
        assert_eq!(tokens[1].text, "Plain");
        assert!(tokens[1].is_plain());
    }

    #[test]
    fn test_reset_code_removes_only_matching_effect() {
        let tokens = parse_ansi("\x1b[1;31mA\x1b[21mB");
        assert_eq!(classes(&tokens[0]), vec!["bold", "text-red"]);
        assert_eq!(classes(&tokens[1]), vec!["text-red"]);
    }

    #[test]
    fn test_default_color_codes() {
        let tokens = parse_ansi("\x1b[4;32;41mA\x1b[39mB\x1b[49mC");
        assert_eq!(classes(&tokens[0]), vec!["underline", "text-green", "bg-red"]);
        assert_eq!(classes(&tokens[1]), vec!["underline", "bg-red"]);
        assert_eq!(classes(&tokens[2]), vec!["underline"]);
    }

    #[test]
    fn test_new_color_replaces_active_color() {
        let tokens = parse_ansi("\x1b[31mA\x1b[92mB");
        assert_eq!(classes(&tokens[1]), vec!["text-bright-green"]);
    }

    #[test]
    fn test_bright_backgrounds() {
        let tokens = parse_ansi("\x1b[1;31;106mX");
        assert_eq!(classes(&tokens[0]), vec!["bold", "text-red", "bg-bright-cyan"]);
    }

    #[test]
    fn test_non_sgr_sequences_are_dropped() {
        let tokens = parse_ansi("\x1b[2Kclean\x1b[1Gline");
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].text, "cleanline");
    }

    #[test]
    fn test_bare_reset_clears_styles() {
        let tokens = parse_ansi("\x1b[1mA\x1b[mB");
        assert_eq!(classes(&tokens[0]), vec!["bold"]);
        assert!(tokens[1].is_plain());
    }

    #[test]
    fn test_strip_ansi_removes_codes() {
        assert_eq!(strip_ansi("\x1b[31mRed text\x1b[0m"), "Red text");
    }

    #[test]
    fn test_cache_hit() {
        let mut decoder = AnsiDecoder::new(10);
        let first = decoder.decode("\x1b[1mbold");
        let second = decoder.decode("\x1b[1mbold");

        assert_eq!(decoder.misses(), 1);
        assert_eq!(decoder.hits(), 1);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_cache_evicts_oldest_first() {
        let mut decoder = AnsiDecoder::new(2);
        decoder.decode("a");
        decoder.decode("b");
        decoder.decode("c");

        assert_eq!(decoder.len(), 2);
        decoder.decode("b");
        assert_eq!(decoder.hits(), 1);
        decoder.decode("a");
        assert_eq!(decoder.misses(), 4);
    }
}
