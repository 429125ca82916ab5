//! Normalized views of Open Library's search, author, and works payloads.

use chrono::Datelike;
use serde::{Deserialize, Deserializer, Serialize};

use crate::lenient;

/// One document of `/search.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BookDetails {
    #[serde(default, deserialize_with = "lenient::first_string")]
    pub author_name: Option<String>,
    #[serde(default, deserialize_with = "lenient::first_string")]
    pub author_key: Option<String>,
    #[serde(default, deserialize_with = "non_negative")]
    pub edition_count: Option<u32>,
    /// Years outside `1000..=next year` are treated as absent.
    #[serde(default, deserialize_with = "plausible_year")]
    pub first_publish_year: Option<i32>,
    #[serde(default, deserialize_with = "lenient::first_string")]
    pub language: Option<String>,
    #[serde(default, deserialize_with = "lenient::trimmed_string")]
    pub title: Option<String>,
}

/// `/search.json` response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OpenLibrarySearch {
    #[serde(default, deserialize_with = "count")]
    pub num_found: u64,
    /// Query echo; filled with the refined query when the API omits it.
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub q: String,
    #[serde(default, deserialize_with = "lenient::items")]
    pub docs: Vec<BookDetails>,
}

/// One entry of `/authors/{id}/works.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthorWorks {
    #[serde(default, deserialize_with = "lenient::first_string")]
    pub author_id: Option<String>,
    #[serde(default, deserialize_with = "lenient::trimmed_string")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "lenient::first_string")]
    pub subtitle: Option<String>,
}

/// Author record, from either the author search index or `/authors/{id}.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthorDetails {
    #[serde(default, deserialize_with = "lenient::first_string")]
    pub key: Option<String>,
    #[serde(default, deserialize_with = "lenient::first_string")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "optional_list")]
    pub alternate_names: Option<Vec<String>>,
    #[serde(default, deserialize_with = "lenient::text_value")]
    pub bio: Option<String>,
    #[serde(default, deserialize_with = "lenient::first_string")]
    pub birth_date: Option<String>,
    #[serde(default, deserialize_with = "lenient::first_string")]
    pub death_date: Option<String>,
    #[serde(default, deserialize_with = "lenient::first_string")]
    pub fuller_name: Option<String>,
    #[serde(default, deserialize_with = "lenient::items")]
    pub works: Vec<AuthorWorks>,
    #[serde(default, deserialize_with = "optional_list")]
    pub top_subjects: Option<Vec<String>>,
}

impl AuthorDetails {
    pub fn add_author_works(&mut self, works: Vec<AuthorWorks>) {
        self.works.extend(works);
    }
}

fn non_negative<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient::integer(deserializer)?.and_then(|n| u32::try_from(n).ok()))
}

fn count<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient::integer(deserializer)?
        .and_then(|n| u64::try_from(n).ok())
        .unwrap_or(0))
}

fn plausible_year<'de, D>(deserializer: D) -> Result<Option<i32>, D::Error>
where
    D: Deserializer<'de>,
{
    let max = i64::from(chrono::Utc::now().year()) + 1;
    Ok(lenient::integer(deserializer)?
        .filter(|y| (1000..=max).contains(y))
        .and_then(|y| i32::try_from(y).ok()))
}

fn optional_list<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let list = lenient::string_list(deserializer)?;
    Ok((!list.is_empty()).then_some(list))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn book_details_coerce_lists_to_first_value() {
        let doc: BookDetails = serde_json::from_value(json!({
            "author_name": ["Jane Austen", "Other"],
            "author_key": ["OL21594A"],
            "edition_count": 3,
            "first_publish_year": 1813,
            "language": ["eng", "fre"],
            "title": " Pride and Prejudice ",
            "unrelated": {"ignored": true}
        }))
        .expect("decode");

        assert_eq!(doc.author_name.as_deref(), Some("Jane Austen"));
        assert_eq!(doc.author_key.as_deref(), Some("OL21594A"));
        assert_eq!(doc.edition_count, Some(3));
        assert_eq!(doc.first_publish_year, Some(1813));
        assert_eq!(doc.language.as_deref(), Some("eng"));
        assert_eq!(doc.title.as_deref(), Some("Pride and Prejudice"));
    }

    #[test]
    fn implausible_values_degrade() {
        let doc: BookDetails = serde_json::from_value(json!({
            "edition_count": -1,
            "first_publish_year": 99999,
            "author_name": []
        }))
        .expect("decode");

        assert!(doc.edition_count.is_none());
        assert!(doc.first_publish_year.is_none());
        assert!(doc.author_name.is_none());
    }

    #[test]
    fn author_bio_accepts_text_object() {
        let author: AuthorDetails = serde_json::from_value(json!({
            "key": "/authors/OL23919A",
            "name": "J. K. Rowling",
            "bio": {"type": "/type/text", "value": "British author."},
            "alternate_names": ["Joanne Rowling"],
            "top_subjects": []
        }))
        .expect("decode");

        assert_eq!(author.bio.as_deref(), Some("British author."));
        assert_eq!(author.alternate_names, Some(vec!["Joanne Rowling".to_string()]));
        assert!(author.top_subjects.is_none());
        assert!(author.works.is_empty());
    }

    #[test]
    fn search_defaults_when_fields_missing() {
        let search: OpenLibrarySearch = serde_json::from_value(json!({})).expect("decode");
        assert_eq!(search.num_found, 0);
        assert!(search.q.is_empty());
        assert!(search.docs.is_empty());
    }
}
