use std::collections::HashMap;

use rand::Rng;

/// Decorative suffixes occasionally appended for variation.
const SUFFIXES: [&str; 5] = ["🙏", "❤️", "🎯", "✨", "🙌"];

/// Characters that already count as a decorative ending; a reply that
/// ends with one of these never gets a second suffix.
const DECORATIVE_ENDINGS: [char; 13] =
    ['😊', '🙏', '❤', '🎉', '💯', '🔥', '🚀', '🎯', '📝', '✨', '💡', '📌', '🙌'];

const SUFFIX_PROBABILITY: f64 = 0.3;

/// Renders reply templates against a variable map, with light
/// randomized variation so repeated replies do not read identically.
pub struct TemplateRenderer;

impl TemplateRenderer {
    /// Substitute `{token}` placeholders and maybe append a suffix.
    ///
    /// `{link}` falls back to "the link in my bio" when the operator
    /// configured no link. Unknown placeholders are left untouched.
    pub fn render(template: &str, vars: &HashMap<String, String>) -> String {
        let mut reply = template.to_string();

        for (key, value) in vars {
            reply = reply.replace(&format!("{{{}}}", key), value);
        }

        if reply.contains("{link}") {
            reply = reply.replace("{link}", "the link in my bio");
        }

        if rand::thread_rng().gen_bool(SUFFIX_PROBABILITY) {
            reply = Self::append_suffix(reply);
        }

        reply.trim().to_string()
    }

    fn append_suffix(reply: String) -> String {
        let trimmed = reply.trim_end();
        let already_decorated = trimmed
            .chars()
            .last()
            .map(|c| DECORATIVE_ENDINGS.contains(&c))
            .unwrap_or(false);

        if already_decorated || trimmed.is_empty() {
            return reply;
        }

        let suffix = SUFFIXES[rand::thread_rng().gen_range(0..SUFFIXES.len())];
        format!("{} {}", trimmed, suffix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn substitutes_name_and_link() {
        let rendered = TemplateRenderer::render(
            "Thanks {name}! See {link}.",
            &vars(&[("name", "Ana"), ("link", "https://example.com")]),
        );
        assert!(rendered.starts_with("Thanks Ana! See https://example.com."));
    }

    #[test]
    fn missing_link_falls_back_to_bio() {
        let rendered = TemplateRenderer::render("Check {link}", &vars(&[("name", "Bo")]));
        assert!(rendered.starts_with("Check the link in my bio"));
    }

    #[test]
    fn suffix_comes_from_known_set_only() {
        for _ in 0..200 {
            let rendered = TemplateRenderer::render("Thanks {name}", &vars(&[("name", "Cy")]));
            let base = "Thanks Cy";
            if rendered != base {
                let extra = rendered.strip_prefix(base).unwrap().trim();
                assert!(SUFFIXES.contains(&extra), "unexpected suffix: {extra:?}");
            }
        }
    }

    #[test]
    fn never_doubles_a_decorative_ending() {
        for _ in 0..200 {
            let rendered = TemplateRenderer::render("Thanks {name} 🙏", &vars(&[("name", "Dee")]));
            assert_eq!(rendered, "Thanks Dee 🙏");
        }
    }
}
