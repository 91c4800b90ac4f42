//! Display form of generated text.
//!
//! [`render`] is recomputed from the full accumulated text on every update,
//! so it holds no state between calls. All backend text is untrusted:
//! [`to_html`] escapes every literal run and only the recognized constructs
//! (fenced code, inline code, links) produce markup.

use once_cell::sync::Lazy;
use regex::Regex;

/// A piece of rendered output, in document order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RenderedBlock {
    /// Plain paragraph text. Single newlines are line breaks; a blank line
    /// ends the paragraph.
    Paragraph(String),
    /// Text between single backticks.
    InlineCode(String),
    /// A `[text](url)` link with an allowed URL scheme.
    Link { text: String, url: String },
    /// A fenced code block. The opening fence may follow text on the same
    /// line but must end its line. An unterminated fence at the end of the
    /// text is rendered as a block too, so code shows while it is still
    /// streaming.
    CodeBlock {
        language: Option<String>,
        code: String,
    },
}

static FENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)```(\w*)[ \t]*(?:\r?\n|\z)(.*?)(?:```|\z)").expect("fence pattern")
});

static INLINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"`([^`]+)`|\[([^\]\n]+)\]\(([^)\s]+)\)").expect("inline pattern")
});

/// Converts accumulated text into display blocks.
pub fn render(text: &str) -> Vec<RenderedBlock> {
    let mut blocks = Vec::new();
    let mut cursor = 0;
    for caps in FENCE.captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        render_inline(&text[cursor..whole.start()], &mut blocks);
        let language = caps
            .get(1)
            .map(|m| m.as_str())
            .filter(|lang| !lang.is_empty())
            .map(ToOwned::to_owned);
        let code = caps.get(2).map(|m| m.as_str().trim()).unwrap_or_default();
        blocks.push(RenderedBlock::CodeBlock {
            language,
            code: code.to_string(),
        });
        cursor = whole.end();
    }
    render_inline(&text[cursor..], &mut blocks);
    blocks
}

fn render_inline(segment: &str, blocks: &mut Vec<RenderedBlock>) {
    let mut cursor = 0;
    for caps in INLINE.captures_iter(segment) {
        let Some(whole) = caps.get(0) else { continue };
        if let Some(code) = caps.get(1) {
            push_text(blocks, &segment[cursor..whole.start()]);
            blocks.push(RenderedBlock::InlineCode(code.as_str().to_string()));
        } else if let (Some(label), Some(url)) = (caps.get(2), caps.get(3)) {
            if !is_safe_url(url.as_str()) {
                continue;
            }
            push_text(blocks, &segment[cursor..whole.start()]);
            blocks.push(RenderedBlock::Link {
                text: label.as_str().to_string(),
                url: url.as_str().to_string(),
            });
        }
        cursor = whole.end();
    }
    push_text(blocks, &segment[cursor..]);
}

fn push_text(blocks: &mut Vec<RenderedBlock>, text: &str) {
    if text.is_empty() {
        return;
    }
    if let Some(RenderedBlock::Paragraph(prev)) = blocks.last_mut() {
        prev.push_str(text);
    } else {
        blocks.push(RenderedBlock::Paragraph(text.to_string()));
    }
}

fn is_safe_url(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    match lower.split_once(':') {
        Some((scheme, _)) if !scheme.contains('/') => {
            matches!(scheme, "http" | "https" | "mailto")
        }
        _ => true,
    }
}

/// Escapes text for inclusion in HTML content or attribute values.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Writes blocks as HTML for a browser surface.
pub fn to_html(blocks: &[RenderedBlock]) -> String {
    let mut writer = HtmlWriter::default();
    for block in blocks {
        match block {
            RenderedBlock::Paragraph(text) => writer.text(text),
            RenderedBlock::InlineCode(code) => {
                writer.open_paragraph();
                writer.out.push_str("<code>");
                writer.out.push_str(&escape_html(code));
                writer.out.push_str("</code>");
            }
            RenderedBlock::Link { text, url } => {
                writer.open_paragraph();
                writer.out.push_str(&format!(
                    "<a href=\"{}\" target=\"_blank\" rel=\"noopener noreferrer\">{}</a>",
                    escape_html(url),
                    escape_html(text)
                ));
            }
            RenderedBlock::CodeBlock { language, code } => {
                writer.close_paragraph();
                let language = escape_html(language.as_deref().unwrap_or("text"));
                writer.out.push_str(&format!(
                    "<div class=\"code-block\"><div class=\"code-header\"><span>{language}</span></div>\
                     <pre><code class=\"language-{language}\">{}</code></pre></div>",
                    escape_html(code)
                ));
            }
        }
    }
    writer.close_paragraph();
    writer.out
}

#[derive(Default)]
struct HtmlWriter {
    out: String,
    in_paragraph: bool,
}

impl HtmlWriter {
    fn open_paragraph(&mut self) {
        if !self.in_paragraph {
            self.out.push_str("<p>");
            self.in_paragraph = true;
        }
    }

    fn close_paragraph(&mut self) {
        if self.in_paragraph {
            self.out.push_str("</p>");
            self.in_paragraph = false;
        }
    }

    fn text(&mut self, text: &str) {
        let normalized = text.replace("\r\n", "\n");
        for (i, para) in normalized.split("\n\n").enumerate() {
            if i > 0 {
                self.close_paragraph();
            }
            if !self.in_paragraph && para.trim().is_empty() {
                continue;
            }
            let trimmed = if self.in_paragraph {
                para
            } else {
                para.trim_start_matches('\n')
            };
            self.open_paragraph();
            self.out
                .push_str(&escape_html(trimmed).replace('\n', "<br>"));
        }
    }
}

/// Flattens blocks back into terminal-friendly text.
pub fn plain_text(blocks: &[RenderedBlock]) -> String {
    let mut out = String::new();
    for block in blocks {
        match block {
            RenderedBlock::Paragraph(text) => out.push_str(text),
            RenderedBlock::InlineCode(code) => out.push_str(code),
            RenderedBlock::Link { text, url } => out.push_str(&format!("{text} <{url}>")),
            RenderedBlock::CodeBlock { language, code } => {
                if !out.is_empty() && !out.ends_with('\n') {
                    out.push('\n');
                }
                out.push_str(&format!("[{}]\n{code}\n", language.as_deref().unwrap_or("text")));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn para(text: &str) -> RenderedBlock {
        RenderedBlock::Paragraph(text.to_string())
    }

    #[test]
    fn fenced_block_with_language() {
        assert_eq!(
            render("```python\nprint(1)\n```"),
            vec![RenderedBlock::CodeBlock {
                language: Some("python".into()),
                code: "print(1)".into(),
            }]
        );
    }

    #[test]
    fn single_inline_code() {
        assert_eq!(render("`x`"), vec![RenderedBlock::InlineCode("x".into())]);
    }

    #[test]
    fn render_is_idempotent() {
        let text = "Intro `a` and [docs](https://ollama.com)\n\n```rust\nfn main() {}\n```\nbye";
        assert_eq!(render(text), render(text));
        assert_eq!(to_html(&render(text)), to_html(&render(text)));
    }

    #[test]
    fn fence_without_language_and_surrounding_text() {
        assert_eq!(
            render("Run:\n```\nls -la\n```\nDone."),
            vec![
                para("Run:\n"),
                RenderedBlock::CodeBlock {
                    language: None,
                    code: "ls -la".into()
                },
                para("\nDone."),
            ]
        );
    }

    #[test]
    fn fence_opened_mid_line() {
        let expected = vec![
            para("Sure! "),
            RenderedBlock::CodeBlock {
                language: Some("python".into()),
                code: "print(1)".into(),
            },
        ];
        assert_eq!(render("Sure! ```python\nprint(1)\n```"), expected);
    }

    #[test]
    fn prose_after_closed_mid_line_fence_stays_text() {
        assert_eq!(
            render("Sure! ```python\nprint(1)\n```\nThanks for asking."),
            vec![
                para("Sure! "),
                RenderedBlock::CodeBlock {
                    language: Some("python".into()),
                    code: "print(1)".into(),
                },
                para("\nThanks for asking."),
            ]
        );
    }

    #[test]
    fn unterminated_fence_renders_partial_code() {
        assert_eq!(
            render("Here:\n```rust\nfn ma"),
            vec![
                para("Here:\n"),
                RenderedBlock::CodeBlock {
                    language: Some("rust".into()),
                    code: "fn ma".into()
                },
            ]
        );
    }

    #[test]
    fn growing_text_renders_consistently() {
        let full = "a `b` c\n```sh\necho hi\n```";
        for end in 0..=full.len() {
            let _ = render(&full[..end]);
        }
        assert_eq!(render(full).len(), 4);
    }

    #[test]
    fn links_with_unsafe_schemes_stay_text() {
        assert_eq!(
            render("[x](javascript:alert(1))"),
            vec![para("[x](javascript:alert(1))")]
        );
        assert_eq!(
            render("see [docs](/api)"),
            vec![
                para("see "),
                RenderedBlock::Link {
                    text: "docs".into(),
                    url: "/api".into()
                }
            ]
        );
    }

    #[test]
    fn html_escapes_untrusted_text() {
        let html = to_html(&render("<script>alert('x')</script> & `<b>`"));
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;alert(&#39;x&#39;)&lt;/script&gt; &amp; "));
        assert!(html.contains("<code>&lt;b&gt;</code>"));
    }

    #[test]
    fn html_paragraphs_and_line_breaks() {
        assert_eq!(
            to_html(&render("one\ntwo\n\nthree")),
            "<p>one<br>two</p><p>three</p>"
        );
    }

    #[test]
    fn html_code_block_defaults_language_to_text() {
        let html = to_html(&render("```\n<tag>\n```"));
        assert!(html.contains("<span>text</span>"));
        assert!(html.contains("<code class=\"language-text\">&lt;tag&gt;</code>"));
    }

    #[test]
    fn plain_text_keeps_code_on_its_own_lines() {
        let text = plain_text(&render("Use `cargo`:\n```sh\ncargo run\n```"));
        assert_eq!(text, "Use cargo:\n[sh]\ncargo run\n");
    }
}
