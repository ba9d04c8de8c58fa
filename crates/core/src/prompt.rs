//! Prompt decoration and reference-image selection.
//!
//! Before dispatch, every prompt gets the selected style text and an
//! aspect-ratio marker appended. Reference images are picked by looking
//! for library names inside the prompt text.

use crate::job::ImageReference;

/// Aspect-ratio marker appended to prompts, e.g. `图片比例【16:9】`.
pub fn ratio_marker(ratio: &str) -> String {
    format!("图片比例【{ratio}】")
}

/// Append `style` and the ratio marker to `prompt`.
///
/// Idempotent: a prompt that already carries the ratio marker is returned
/// unchanged, and style text already present is not repeated.
pub fn decorate_prompt(prompt: &str, style: Option<&str>, ratio: Option<&str>) -> String {
    let mut out = prompt.trim().to_string();

    let marker = ratio.map(str::trim).filter(|r| !r.is_empty()).map(ratio_marker);
    if let Some(marker) = &marker {
        if out.contains(marker.as_str()) {
            return out;
        }
    }

    if let Some(style) = style.map(str::trim).filter(|s| !s.is_empty()) {
        if !out.contains(style) {
            out = format!("{out} {style}");
        }
    }
    if let Some(marker) = marker {
        out = format!("{out} {marker}");
    }
    out
}

/// Library references whose names appear in `prompt`.
///
/// Longer names are tried first so that e.g. `red fox` is attached
/// ahead of `fox`; a name is attached at most once.
pub fn match_references(prompt: &str, library: &[ImageReference]) -> Vec<ImageReference> {
    let mut candidates: Vec<&ImageReference> = library
        .iter()
        .filter(|r| !r.name().trim().is_empty())
        .collect();
    candidates.sort_by(|a, b| b.name().chars().count().cmp(&a.name().chars().count()));

    let mut matched: Vec<ImageReference> = Vec::new();
    for reference in candidates {
        let name = reference.name().trim();
        if prompt.contains(name) && !matched.iter().any(|m| m.name().trim() == name) {
            matched.push(reference.clone());
        }
    }
    matched
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote(name: &str) -> ImageReference {
        ImageReference::Remote {
            name: name.into(),
            url: format!("https://lib.example/{name}.png"),
        }
    }

    #[test]
    fn appends_style_then_ratio() {
        assert_eq!(
            decorate_prompt("a cat", Some("watercolor"), Some("16:9")),
            "a cat watercolor 图片比例【16:9】"
        );
    }

    #[test]
    fn decoration_is_idempotent() {
        let once = decorate_prompt("a cat", Some("watercolor"), Some("1:1"));
        assert_eq!(decorate_prompt(&once, Some("watercolor"), Some("1:1")), once);
    }

    #[test]
    fn style_not_repeated() {
        assert_eq!(
            decorate_prompt("a watercolor cat", Some("watercolor"), None),
            "a watercolor cat"
        );
    }

    #[test]
    fn no_decoration_without_inputs() {
        assert_eq!(decorate_prompt(" a cat ", None, Some("  ")), "a cat");
    }

    #[test]
    fn matches_longest_names_first() {
        let library = vec![remote("fox"), remote("red fox"), remote("owl"), remote("")];
        let matched = match_references("a red fox beside a river", &library);
        let names: Vec<&str> = matched.iter().map(ImageReference::name).collect();
        assert_eq!(names, ["red fox", "fox"]);
    }

    #[test]
    fn duplicate_names_attached_once() {
        let library = vec![remote("owl"), remote("owl")];
        assert_eq!(match_references("an owl", &library).len(), 1);
    }
}
