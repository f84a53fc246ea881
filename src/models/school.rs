use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct School {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub school_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SchoolEvent {
    pub id: String,
    pub school_id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub event_date: String,
    #[serde(default)]
    pub event_type: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub total_pages: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            limit: DEFAULT_PAGE_SIZE,
            total: 0,
            total_pages: 0,
        }
    }
}

impl Pagination {
    pub fn has_more(&self) -> bool {
        self.page < self.total_pages
    }
}

pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// `GET /schools` payload.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchoolPage {
    #[serde(default)]
    pub schools: Vec<School>,
    pub pagination: Pagination,
}

/// Search filter for a fresh `fetch_schools` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchoolFilter {
    pub search: Option<String>,
    pub city: Option<String>,
    pub limit: Option<u32>,
}

impl SchoolFilter {
    pub fn query(&self, page: u32) -> Vec<(String, String)> {
        let mut query = vec![
            ("page".to_string(), page.to_string()),
            (
                "limit".to_string(),
                self.limit.unwrap_or(DEFAULT_PAGE_SIZE).to_string(),
            ),
        ];
        if let Some(search) = self.search.as_deref().filter(|s| !s.trim().is_empty()) {
            query.push(("search".to_string(), search.trim().to_string()));
        }
        if let Some(city) = self.city.as_deref().filter(|s| !s.trim().is_empty()) {
            query.push(("city".to_string(), city.trim().to_string()));
        }
        query
    }
}
