//! Content resolution for runs: what text, image and product name a run
//! publishes, how prompt templates are filled in, and how post URLs are
//! derived from platform post ids.

use serde::{Deserialize, Serialize};

/// Base URL used to derive a permalink from a bare platform post id.
pub const DEFAULT_POST_URL_BASE: &str = "https://facebook.com";

/// Cached preview stored on a rule (rendered text, image, product name).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RulePreview {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub product_name: String,
}

/// Payload content for a single run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunContent {
    pub text: String,
    pub image_url: String,
    pub product_name: String,
}

/// The product fields content resolution needs.
#[derive(Debug, Clone, Copy)]
pub struct ProductRef<'a> {
    pub name: &'a str,
    pub first_image: Option<&'a str>,
}

/// Resolve the content a run publishes.
///
/// - text: caller-edited text (even when empty), then the cached preview
///   text, then `""`
/// - image: the cached preview image, then the product's first image, then `""`
/// - product name: the cached preview's product name, then the product's name
pub fn resolve_run_content(
    edited_text: Option<&str>,
    preview: Option<&RulePreview>,
    product: ProductRef<'_>,
) -> RunContent {
    let text = edited_text
        .map(str::to_owned)
        .or_else(|| preview.map(|p| p.text.clone()))
        .unwrap_or_default();

    let image_url = preview
        .and_then(|p| p.image_url.clone())
        .or_else(|| product.first_image.map(str::to_owned))
        .unwrap_or_default();

    let product_name = preview
        .map(|p| p.product_name.clone())
        .unwrap_or_else(|| product.name.to_owned());

    RunContent {
        text,
        image_url,
        product_name,
    }
}

/// Resolve the permalink of a published post: an explicit URL wins, then a
/// URL derived from the platform post id.
pub fn resolve_post_url(
    post_url: Option<&str>,
    post_id: Option<&str>,
    base: &str,
) -> Option<String> {
    if let Some(url) = post_url.filter(|u| !u.is_empty()) {
        return Some(url.to_owned());
    }
    post_id
        .filter(|id| !id.is_empty())
        .map(|id| format!("{}/{id}", base.trim_end_matches('/')))
}

// ---------------------------------------------------------------------------
// Prompt templates
// ---------------------------------------------------------------------------

/// Values substituted into `[TOKEN]` placeholders of a prompt template.
#[derive(Debug, Clone, Default)]
pub struct PromptContext<'a> {
    pub product_name: &'a str,
    pub product_description: &'a str,
    pub rule_name: &'a str,
    pub platform: &'a str,
    pub schedule_time: &'a str,
    pub frequency: &'a str,
    pub status: &'a str,
}

impl PromptContext<'_> {
    fn placeholders(&self) -> [(&'static str, &str); 7] {
        [
            ("[PRODUCT_NAME]", self.product_name),
            ("[PRODUCT_DESC]", self.product_description),
            ("[RULE_NAME]", self.rule_name),
            ("[PLATFORM]", self.platform),
            ("[SCHEDULE_TIME]", self.schedule_time),
            ("[FREQUENCY]", self.frequency),
            ("[STATUS]", self.status),
        ]
    }
}

/// Replace every known `[TOKEN]` in `template`. Unknown tokens are left as-is.
pub fn render_prompt(template: &str, ctx: &PromptContext<'_>) -> String {
    ctx.placeholders()
        .iter()
        .fold(template.to_owned(), |acc, (token, value)| acc.replace(token, value))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn preview(image: Option<&str>) -> RulePreview {
        RulePreview {
            text: "cached text".into(),
            image_url: image.map(Into::into),
            product_name: "Cached Product".into(),
        }
    }

    const PRODUCT: ProductRef<'static> = ProductRef {
        name: "Live Product",
        first_image: Some("https://cdn/live.png"),
    };

    #[test]
    fn edited_text_wins_over_preview() {
        let p = preview(None);
        let content = resolve_run_content(Some("edited"), Some(&p), PRODUCT);
        assert_eq!(content.text, "edited");
    }

    #[test]
    fn preview_text_used_when_not_edited() {
        let p = preview(None);
        let content = resolve_run_content(None, Some(&p), PRODUCT);
        assert_eq!(content.text, "cached text");
        assert_eq!(content.product_name, "Cached Product");
    }

    #[test]
    fn empty_text_without_preview() {
        let content = resolve_run_content(None, None, PRODUCT);
        assert_eq!(content.text, "");
        assert_eq!(content.product_name, "Live Product");
    }

    #[test]
    fn preview_image_wins_over_product_image() {
        let p = preview(Some("https://cdn/preview.png"));
        let content = resolve_run_content(None, Some(&p), PRODUCT);
        assert_eq!(content.image_url, "https://cdn/preview.png");
    }

    #[test]
    fn product_image_is_fallback() {
        let p = preview(None);
        let content = resolve_run_content(None, Some(&p), PRODUCT);
        assert_eq!(content.image_url, "https://cdn/live.png");
    }

    #[test]
    fn empty_image_when_nothing_available() {
        let product = ProductRef {
            name: "Bare",
            first_image: None,
        };
        let content = resolve_run_content(None, None, product);
        assert_eq!(content.image_url, "");
    }

    #[test]
    fn post_url_precedence() {
        let base = DEFAULT_POST_URL_BASE;
        assert_eq!(
            resolve_post_url(Some("https://x/p/1"), Some("123"), base).as_deref(),
            Some("https://x/p/1")
        );
        assert_eq!(
            resolve_post_url(None, Some("123_456"), base).as_deref(),
            Some("https://facebook.com/123_456")
        );
        assert_eq!(resolve_post_url(None, None, base), None);
        assert_eq!(resolve_post_url(Some(""), None, base), None);
    }

    #[test]
    fn render_prompt_fills_known_tokens() {
        let ctx = PromptContext {
            product_name: "Tea",
            product_description: "Green tea",
            rule_name: "Morning",
            platform: "SOCIAL",
            schedule_time: "09:00",
            frequency: "DAILY",
            status: "ACTIVE",
        };
        let out = render_prompt(
            "Write about [PRODUCT_NAME] ([PRODUCT_DESC]) for [PLATFORM] at [SCHEDULE_TIME]. [PRODUCT_NAME]! [UNKNOWN]",
            &ctx,
        );
        assert_eq!(
            out,
            "Write about Tea (Green tea) for SOCIAL at 09:00. Tea! [UNKNOWN]"
        );
    }

    #[test]
    fn preview_deserializes_camel_case() {
        let p: RulePreview = serde_json::from_str(
            r#"{"text":"hi","imageUrl":"https://i","productName":"P"}"#,
        )
        .unwrap();
        assert_eq!(p.image_url.as_deref(), Some("https://i"));
    }
}
