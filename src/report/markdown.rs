use pulldown_cmark::{Options, Parser, html};

/// Render report markdown to HTML.
///
/// Tables and strikethrough are enabled; the report model uses both.
pub fn render_markdown(markdown: &str) -> String {
    let options = Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH;
    let parser = Parser::new_ext(markdown, options);
    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
}
