use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Idiom {
    pub id: i64,
    pub word: String,
    pub part_of_speech: Option<String>,
    pub definition: Option<String>,
    pub example: Option<String>,
    pub synonyms: Option<String>,
    pub antonyms: Option<String>,
}

impl Idiom {
    pub fn definition_display(&self) -> &str {
        self.definition.as_deref().unwrap_or("(no definition)")
    }
}

/// Default page size of the idiom search endpoint
pub const DEFAULT_IDIOM_PAGE_SIZE: u32 = 30;

/// One page of idiom search results
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdiomPage {
    #[serde(default)]
    pub content: Vec<Idiom>,
    /// Zero-based page index
    #[serde(default)]
    pub number: u32,
    #[serde(default)]
    pub size: u32,
    #[serde(default)]
    pub total_elements: u64,
    #[serde(default)]
    pub total_pages: u32,
}

impl IdiomPage {
    pub fn has_next(&self) -> bool {
        self.number + 1 < self.total_pages
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_page() {
        let page: IdiomPage = serde_json::from_str(
            r#"{"content":[{"id":1,"word":"画蛇添足","definition":null}],
                "pageable":{"pageNumber":0},"number":0,"size":30,
                "totalElements":31,"totalPages":2,"first":true,"last":false}"#,
        )
        .unwrap();
        assert_eq!(page.content.len(), 1);
        assert_eq!(page.content[0].definition_display(), "(no definition)");
        assert_eq!(page.total_elements, 31);
        assert!(page.has_next());
    }
}
