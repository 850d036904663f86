use arboard::Clipboard;

use crate::ansi::{AnsiDecoder, strip_ansi};
use crate::error::ClipboardError;
use crate::log::LogRecord;

/// Selected rows as plain text and as styled HTML
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClipboardContent {
    pub text: String,
    pub html: String,
}

pub fn export_records(records: &[&LogRecord], decoder: &mut AnsiDecoder) -> ClipboardContent {
    let text = records
        .iter()
        .map(|record| format!("{} {}", record.formatted_date(), strip_ansi(&record.message)))
        .collect::<Vec<_>>()
        .join("\n");

    let mut html = String::from("<pre>");
    for (i, record) in records.iter().enumerate() {
        if i > 0 {
            html.push('\n');
        }
        html.push_str(&escape_html(&record.formatted_date()));
        html.push(' ');
        for token in decoder.decode(&record.message).iter() {
            if token.is_plain() {
                html.push_str(&escape_html(&token.text));
            } else {
                html.push_str(&format!(
                    "<span class=\"{}\">{}</span>",
                    token.class_names().join(" "),
                    escape_html(&token.text)
                ));
            }
        }
    }
    html.push_str("</pre>");

    ClipboardContent { text, html }
}

/// Put both representations on the system clipboard, plain text as the
/// fallback for targets without HTML support
pub fn write_clipboard(content: &ClipboardContent) -> Result<(), ClipboardError> {
    let mut clipboard = Clipboard::new()?;
    clipboard.set_html(content.html.as_str(), Some(content.text.as_str()))?;
    Ok(())
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}
