//! Image adjustments applied to a loaded document before capture.
//!
//! Each `<img>` is marked `loading="lazy"`; images whose inline style does
//! not already set `max-width` get one, so oversized images cannot blow up
//! the page layout. The adjustment runs inside the page after load, so
//! every image has already been fetched by the time it is marked.

use serde::Deserialize;

use super::types::RenderFailure;

pub const DEFAULT_IMAGE_MAX_WIDTH: &str = "800px";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageTransform {
    max_width: String,
}

/// Counts reported back by the page after the adjustment ran.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct TransformOutcome {
    pub images: u32,
    pub capped: u32,
}

impl Default for ImageTransform {
    fn default() -> Self {
        Self::new(DEFAULT_IMAGE_MAX_WIDTH)
    }
}

impl ImageTransform {
    pub fn new(max_width: impl Into<String>) -> Self {
        Self {
            max_width: max_width.into(),
        }
    }

    pub fn max_width(&self) -> &str {
        &self.max_width
    }

    /// Script evaluated in the page; it returns a [`TransformOutcome`] object.
    pub fn script(&self) -> Result<String, RenderFailure> {
        let max_width = serde_json::to_string(&self.max_width)
            .map_err(|err| RenderFailure::transform(err.to_string()))?;

        Ok(format!(
            r#"(() => {{
  const maxWidth = {max_width};
  let images = 0;
  let capped = 0;
  document.querySelectorAll("img").forEach((img) => {{
    images += 1;
    img.setAttribute("loading", "lazy");
    if (!img.style.maxWidth) {{
      img.style.maxWidth = maxWidth;
      capped += 1;
    }}
  }});
  return {{ images, capped }};
}})()"#
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_caps_with_configured_width() {
        let script = ImageTransform::new("640px").script().expect("script");

        assert!(script.contains(r#"const maxWidth = "640px";"#));
        assert!(script.contains(r#"img.setAttribute("loading", "lazy")"#));
        assert!(script.contains("if (!img.style.maxWidth)"));
    }

    #[test]
    fn script_escapes_width_literal() {
        let script = ImageTransform::new(r#"1px"; alert(1); ""#)
            .script()
            .expect("script");

        assert!(script.contains(r#"const maxWidth = "1px\"; alert(1); \"";"#));
    }

    #[test]
    fn default_width_is_800px() {
        assert_eq!(ImageTransform::default().max_width(), "800px");
    }

    #[test]
    fn outcome_reads_page_result() {
        let outcome: TransformOutcome =
            serde_json::from_str(r#"{"images":3,"capped":2}"#).expect("outcome");
        assert_eq!(outcome, TransformOutcome { images: 3, capped: 2 });
    }
}
