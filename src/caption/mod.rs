//! Caption rewriting applied before every delivery.
//!
//! Apply order (shown to admins by `/caption`):
//! strip links → custom template → global fallback → replace →
//! link replace → replace all links → append.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::database::CaptionSettings;
use crate::utils::html_escape;

static ANCHOR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<a\b[^>]*>.*?</a>").expect("anchor regex"));

static PAREN_URL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\(\s*(?:https?://|www\.|t\.me/)[^\s)]*\s*\)").expect("paren url regex")
});

static URL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)(?:https?://|www\.|\bt\.me/)[^\s<>"']+"#).expect("url regex")
});

static PLACEHOLDER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{(?:filename|previouscaption)\}").expect("placeholder regex"));

static MULTI_SPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]{2,}").expect("space regex"));

static MULTI_NEWLINE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").expect("newline regex"));

/// What the pipeline knows about the media being delivered.
#[derive(Debug, Clone, Copy, Default)]
pub struct CaptionInput<'a> {
    /// Raw caption (HTML).
    pub caption: Option<&'a str>,
    pub file_name: Option<&'a str>,
    pub is_document: bool,
}

/// Run the full pipeline. Returns `None` when nothing is left to show.
pub fn render(input: CaptionInput<'_>, settings: &CaptionSettings) -> Option<String> {
    let mut text = input.caption.unwrap_or_default().to_string();

    if settings.strip_links {
        text = strip_links(&text);
    }

    if input.is_document
        && let Some(template) = settings.custom_caption.as_deref().filter(|t| !t.is_empty())
    {
        let file_name = html_escape(input.file_name.unwrap_or_default());
        let previous = std::mem::take(&mut text);
        // One pass, so substituted values are never scanned for placeholders.
        text = PLACEHOLDER_RE
            .replace_all(template, |caps: &regex::Captures| match &caps[0] {
                "{filename}" => file_name.clone(),
                _ => previous.clone(),
            })
            .into_owned();
    }

    if text.trim().is_empty()
        && settings.global_caption.enabled
        && !settings.global_caption.text.is_empty()
    {
        text = settings.global_caption.text.clone();
    }

    if let Some(pair) = settings.replace.as_ref().filter(|p| !p.old.is_empty()) {
        text = text.replace(&pair.old, &pair.new);
    }

    if let Some(pair) = settings.link_replace.as_ref().filter(|p| !p.old.is_empty()) {
        text = text.replace(&pair.old, &pair.new);
    }

    if settings.replace_all_link.enabled && !settings.replace_all_link.value.is_empty() {
        text = URL_RE
            .replace_all(&text, regex::NoExpand(&settings.replace_all_link.value))
            .into_owned();
    }

    if let Some(append) = settings.append.as_deref().filter(|a| !a.is_empty()) {
        if text.trim().is_empty() {
            text = append.to_string();
        } else {
            text = format!("{}\n{}", text, append);
        }
    }

    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

/// Remove anchors and URLs, then tidy the whitespace they leave behind.
pub fn strip_links(text: &str) -> String {
    let text = ANCHOR_RE.replace_all(text, "");
    let text = PAREN_URL_RE.replace_all(&text, "");
    let text = URL_RE.replace_all(&text, "");
    let text = MULTI_SPACE_RE.replace_all(&text, " ");

    let lines: Vec<&str> = text.lines().map(str::trim).collect();
    let text = lines.join("\n");

    MULTI_NEWLINE_RE.replace_all(&text, "\n\n").trim().to_string()
}

/// Human-readable summary of the current settings.
pub fn overview(settings: &CaptionSettings) -> String {
    let on_off = |b: bool| if b { "ON" } else { "OFF" };
    let pair = |p: &Option<crate::database::ReplacePair>| match p {
        Some(p) => format!("<code>{}</code> → <code>{}</code>", html_escape(&p.old), html_escape(&p.new)),
        None => "—".to_string(),
    };
    let opt = |s: &Option<String>| match s {
        Some(s) if !s.is_empty() => format!("<code>{}</code>", html_escape(s)),
        _ => "—".to_string(),
    };

    format!(
        "<b>Caption settings</b>\n\n\
         Strip links: <b>{}</b>\n\
         Custom caption: {}\n\
         Global caption: <b>{}</b> {}\n\
         Replace: {}\n\
         Link replace: {}\n\
         Replace all links: <b>{}</b> {}\n\
         Append: {}\n\
         Protect content: <b>{}</b>\n\n\
         <b>Apply order:</b> strip links → custom caption (documents) → global caption (if empty) → \
         replace → link replace → replace all links → append",
        on_off(settings.strip_links),
        opt(&settings.custom_caption),
        on_off(settings.global_caption.enabled),
        opt(&Some(settings.global_caption.text.clone())),
        pair(&settings.replace),
        pair(&settings.link_replace),
        on_off(settings.replace_all_link.enabled),
        opt(&Some(settings.replace_all_link.value.clone())),
        opt(&settings.append),
        on_off(settings.protect_content),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{GlobalCaption, ReplaceAllLink, ReplacePair};

    fn plain(caption: &str) -> CaptionInput<'_> {
        CaptionInput {
            caption: Some(caption),
            ..Default::default()
        }
    }

    #[test]
    fn test_strip_and_append_scenario() {
        let settings = CaptionSettings {
            strip_links: true,
            append: Some("- via Bot".into()),
            ..Default::default()
        };
        assert_eq!(
            render(plain("Check http://x.co now"), &settings).as_deref(),
            Some("Check now\n- via Bot")
        );
    }

    #[test]
    fn test_strip_links_forms() {
        let text = "Join <a href=\"https://t.me/x\">here</a> (https://a.b/c) www.site.com\n\n\n\nend  ";
        assert_eq!(strip_links(text), "Join\n\nend");
    }

    #[test]
    fn test_template_only_for_documents() {
        let settings = CaptionSettings {
            custom_caption: Some("{filename} | {previouscaption}".into()),
            ..Default::default()
        };
        let doc = CaptionInput {
            caption: Some("old"),
            file_name: Some("a&b.pdf"),
            is_document: true,
        };
        assert_eq!(render(doc, &settings).as_deref(), Some("a&amp;b.pdf | old"));
        assert_eq!(render(plain("old"), &settings).as_deref(), Some("old"));
    }

    #[test]
    fn test_template_values_are_not_expanded() {
        let settings = CaptionSettings {
            custom_caption: Some("{filename}\n{previouscaption}".into()),
            ..Default::default()
        };
        let doc = CaptionInput {
            caption: Some("see {filename}"),
            file_name: Some("{previouscaption}.pdf"),
            is_document: true,
        };
        assert_eq!(
            render(doc, &settings).as_deref(),
            Some("{previouscaption}.pdf\nsee {filename}")
        );
    }

    #[test]
    fn test_global_caption_fallback() {
        let settings = CaptionSettings {
            global_caption: GlobalCaption {
                text: "Shared by vault".into(),
                enabled: true,
            },
            ..Default::default()
        };
        assert_eq!(render(CaptionInput::default(), &settings).as_deref(), Some("Shared by vault"));
        assert_eq!(render(plain("mine"), &settings).as_deref(), Some("mine"));
    }

    #[test]
    fn test_global_caption_disabled() {
        let settings = CaptionSettings {
            global_caption: GlobalCaption {
                text: "unused".into(),
                enabled: false,
            },
            ..Default::default()
        };
        assert_eq!(render(CaptionInput::default(), &settings), None);
    }

    #[test]
    fn test_replace_then_link_replace_order() {
        let settings = CaptionSettings {
            replace: Some(ReplacePair { old: "foo".into(), new: "bar".into() }),
            link_replace: Some(ReplacePair { old: "bar".into(), new: "baz".into() }),
            ..Default::default()
        };
        assert_eq!(render(plain("foo"), &settings).as_deref(), Some("baz"));
    }

    #[test]
    fn test_replace_all_links() {
        let settings = CaptionSettings {
            replace_all_link: ReplaceAllLink {
                value: "https://t.me/mine".into(),
                enabled: true,
            },
            ..Default::default()
        };
        assert_eq!(
            render(plain("a https://x.y/z b t.me/other"), &settings).as_deref(),
            Some("a https://t.me/mine b https://t.me/mine")
        );
    }

    #[test]
    fn test_strip_runs_before_global_fallback() {
        let settings = CaptionSettings {
            strip_links: true,
            global_caption: GlobalCaption {
                text: "fallback".into(),
                enabled: true,
            },
            ..Default::default()
        };
        assert_eq!(render(plain("https://only.link"), &settings).as_deref(), Some("fallback"));
    }

    #[test]
    fn test_append_is_not_idempotent() {
        let settings = CaptionSettings {
            append: Some("tail".into()),
            ..Default::default()
        };
        let once = render(plain("x"), &settings).unwrap();
        let twice = render(plain(&once), &settings).unwrap();
        assert_eq!(twice, "x\ntail\ntail");
    }

    #[test]
    fn test_empty_everything_is_none() {
        assert_eq!(render(plain("   "), &CaptionSettings::default()), None);
    }

    #[test]
    fn test_overview_lists_order() {
        let text = overview(&CaptionSettings::default());
        assert!(text.contains("Apply order"));
        assert!(text.contains("Strip links: <b>OFF</b>"));
    }
}
