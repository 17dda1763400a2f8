//! Extraction recipes: a tiny, linear query language over a parsed HTML document.
//!
//! A recipe is an ordered list of [`ExtractionStep`]s. `Find` steps narrow a cursor down the
//! tree, a `GetAttribute` step reads the result off the cursor and ends execution.

use scraper::{ElementRef, Html};
use thiserror::Error;

/// Attribute names that read the element's text content when no such attribute exists.
const TEXT_ATTRIBUTES: [&str; 2] = ["text", "#text"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionStep {
    /// Move to the first descendant matching every selector that is set.
    Find {
        tag_name: Option<String>,
        tag_class: Option<String>,
        tag_id: Option<String>,
    },
    /// Read an attribute off the current element. Terminal.
    GetAttribute { attribute_name: String },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecipeError {
    #[error("unknown step type '{0}'")]
    UnknownStepType(String),
    #[error("'get' step has no attribute name")]
    MissingAttributeName,
}

impl ExtractionStep {
    pub fn find(tag_name: &str) -> Self {
        ExtractionStep::Find {
            tag_name: Some(tag_name.to_string()),
            tag_class: None,
            tag_id: None,
        }
    }

    pub fn find_with_class(tag_name: &str, class: &str) -> Self {
        ExtractionStep::Find {
            tag_name: Some(tag_name.to_string()),
            tag_class: Some(class.to_string()),
            tag_id: None,
        }
    }

    pub fn get(attribute_name: &str) -> Self {
        ExtractionStep::GetAttribute {
            attribute_name: attribute_name.to_string(),
        }
    }

    /// Decode a stored step row. `get` rows keep the attribute name in the tag name column.
    pub fn from_row(
        step_type: &str,
        tag_name: Option<String>,
        tag_class: Option<String>,
        tag_id: Option<String>,
    ) -> Result<Self, RecipeError> {
        match step_type.trim().to_ascii_lowercase().as_str() {
            "find" => Ok(ExtractionStep::Find {
                tag_name: non_empty(tag_name),
                tag_class: non_empty(tag_class),
                tag_id: non_empty(tag_id),
            }),
            "get" => {
                let attribute_name = non_empty(tag_name).ok_or(RecipeError::MissingAttributeName)?;
                Ok(ExtractionStep::GetAttribute { attribute_name })
            }
            other => Err(RecipeError::UnknownStepType(other.to_string())),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

#[derive(Clone, Copy)]
enum Cursor<'a> {
    Document(&'a Html),
    Element(ElementRef<'a>),
}

/// Run `steps` against a parsed document.
pub fn execute(steps: &[ExtractionStep], document: &Html) -> Option<String> {
    run(steps, Cursor::Document(document))
}

fn run(steps: &[ExtractionStep], mut cursor: Cursor<'_>) -> Option<String> {
    for step in steps {
        match step {
            ExtractionStep::Find {
                tag_name,
                tag_class,
                tag_id,
            } => {
                let selector = Selector {
                    tag_name: tag_name.as_deref(),
                    tag_class: tag_class.as_deref(),
                    tag_id: tag_id.as_deref(),
                };
                cursor = Cursor::Element(find_first(cursor, &selector)?);
            }
            ExtractionStep::GetAttribute { attribute_name } => {
                return match cursor {
                    Cursor::Element(element) => read_attribute(element, attribute_name),
                    Cursor::Document(_) => None,
                };
            }
        }
    }

    None
}

struct Selector<'s> {
    tag_name: Option<&'s str>,
    tag_class: Option<&'s str>,
    tag_id: Option<&'s str>,
}

impl Selector<'_> {
    fn matches(&self, element: ElementRef<'_>) -> bool {
        let el = element.value();

        if let Some(name) = self.tag_name {
            if !el.name().eq_ignore_ascii_case(name) {
                return false;
            }
        }

        if let Some(class) = self.tag_class {
            let matched = if class.contains(char::is_whitespace) {
                // multi-class values compare against the class list joined by single spaces
                el.attr("class")
                    .map(|attr| attr.split_whitespace().collect::<Vec<_>>().join(" "))
                    .as_deref()
                    == Some(class)
            } else {
                el.classes().any(|c| c == class)
            };
            if !matched {
                return false;
            }
        }

        match self.tag_id {
            Some(id) => el.id() == Some(id),
            None => true,
        }
    }
}

fn find_first<'a>(cursor: Cursor<'a>, selector: &Selector<'_>) -> Option<ElementRef<'a>> {
    let candidates = match cursor {
        // the document node's descendants include the root element itself
        Cursor::Document(doc) => doc.root_element().descendants(),
        Cursor::Element(element) => {
            let mut it = element.descendants();
            it.next();
            it
        }
    };

    candidates
        .filter_map(ElementRef::wrap)
        .find(|el| selector.matches(*el))
}

fn read_attribute(element: ElementRef<'_>, name: &str) -> Option<String> {
    if let Some(value) = element.value().attr(name) {
        return Some(value.to_string());
    }

    if TEXT_ATTRIBUTES.contains(&name) {
        let text = element.text().collect::<String>();
        return Some(text.trim().to_string());
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html><body>
          <nav><a href="/about">About</a></nav>
          <div class="sidebar"><a href="/old">Old</a></div>
          <div class="post featured" id="latest">
            <h2 class="title">  Second post  </h2>
            <a href="http://a.test/p2">read</a>
          </div>
          <div class="post"><a href="http://a.test/p1">read</a></div>
        </body></html>
    "#;

    fn doc() -> Html {
        Html::parse_document(PAGE)
    }

    #[test]
    fn finds_nested_link() {
        let steps = vec![
            ExtractionStep::find_with_class("div", "post"),
            ExtractionStep::find("a"),
            ExtractionStep::get("href"),
        ];
        assert_eq!(execute(&steps, &doc()).as_deref(), Some("http://a.test/p2"));
    }

    #[test]
    fn first_match_wins_in_document_order() {
        let steps = vec![ExtractionStep::find("a"), ExtractionStep::get("href")];
        assert_eq!(execute(&steps, &doc()).as_deref(), Some("/about"));
    }

    #[test]
    fn empty_recipe_is_absent() {
        assert_eq!(execute(&[], &doc()), None);
    }

    #[test]
    fn recipe_without_get_is_absent() {
        let steps = vec![ExtractionStep::find("div")];
        assert_eq!(execute(&steps, &doc()), None);
    }

    #[test]
    fn unmatched_find_short_circuits() {
        let steps = vec![
            ExtractionStep::find_with_class("div", "missing"),
            ExtractionStep::find("a"),
            ExtractionStep::get("href"),
        ];
        assert_eq!(execute(&steps, &doc()), None);
    }

    #[test]
    fn get_on_document_is_absent() {
        let steps = vec![ExtractionStep::get("href")];
        assert_eq!(execute(&steps, &doc()), None);
    }

    #[test]
    fn missing_attribute_is_absent() {
        let steps = vec![ExtractionStep::find("a"), ExtractionStep::get("title")];
        assert_eq!(execute(&steps, &doc()), None);
    }

    #[test]
    fn id_and_class_are_anded() {
        let by_id = vec![
            ExtractionStep::Find {
                tag_name: Some("div".into()),
                tag_class: Some("post".into()),
                tag_id: Some("latest".into()),
            },
            ExtractionStep::find("a"),
            ExtractionStep::get("href"),
        ];
        assert_eq!(execute(&by_id, &doc()).as_deref(), Some("http://a.test/p2"));

        let wrong_class = vec![
            ExtractionStep::Find {
                tag_name: Some("div".into()),
                tag_class: Some("sidebar".into()),
                tag_id: Some("latest".into()),
            },
            ExtractionStep::get("id"),
        ];
        assert_eq!(execute(&wrong_class, &doc()), None);
    }

    #[test]
    fn find_without_tag_name_matches_any_element() {
        let steps = vec![
            ExtractionStep::Find {
                tag_name: None,
                tag_class: None,
                tag_id: Some("latest".into()),
            },
            ExtractionStep::get("class"),
        ];
        assert_eq!(execute(&steps, &doc()).as_deref(), Some("post featured"));
    }

    #[test]
    fn multi_class_value_matches_whole_attribute() {
        let steps = vec![
            ExtractionStep::find_with_class("div", "post featured"),
            ExtractionStep::get("id"),
        ];
        assert_eq!(execute(&steps, &doc()).as_deref(), Some("latest"));

        let reordered = vec![
            ExtractionStep::find_with_class("div", "featured post"),
            ExtractionStep::get("id"),
        ];
        assert_eq!(execute(&reordered, &doc()), None);
    }

    #[test]
    fn multi_class_value_ignores_irregular_spacing() {
        let document = Html::parse_document(
            "<html><body><div class=\"post  featured\n  wide\" id=\"x\"></div></body></html>",
        );
        let steps = vec![
            ExtractionStep::find_with_class("div", "post featured wide"),
            ExtractionStep::get("id"),
        ];
        assert_eq!(execute(&steps, &document).as_deref(), Some("x"));
    }

    #[test]
    fn text_convention_reads_trimmed_content() {
        let steps = vec![
            ExtractionStep::find_with_class("h2", "title"),
            ExtractionStep::get("text"),
        ];
        assert_eq!(execute(&steps, &doc()).as_deref(), Some("Second post"));
    }

    #[test]
    fn find_on_element_skips_the_element_itself() {
        let steps = vec![
            ExtractionStep::find("div"),
            ExtractionStep::find("div"),
            ExtractionStep::get("class"),
        ];
        // the second find searches below the sidebar div, which has no nested div
        assert_eq!(execute(&steps, &doc()), None);
    }

    #[test]
    fn decodes_stored_rows() {
        assert_eq!(
            ExtractionStep::from_row("find", Some("div".into()), Some("post".into()), None),
            Ok(ExtractionStep::find_with_class("div", "post"))
        );
        assert_eq!(
            ExtractionStep::from_row("GET", Some("href".into()), None, None),
            Ok(ExtractionStep::get("href"))
        );
        assert_eq!(
            ExtractionStep::from_row("get", None, None, None),
            Err(RecipeError::MissingAttributeName)
        );
        assert_eq!(
            ExtractionStep::from_row("select", Some("a".into()), None, None),
            Err(RecipeError::UnknownStepType("select".into()))
        );
    }
}
