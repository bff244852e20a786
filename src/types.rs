use serde::Deserialize;
use validator::Validate;

/// Window of a multi document read.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(default)]
pub struct Pagination {
    #[validate(range(min = 1, max = 250))]
    limit: u8,
    offset: u32,
}

impl Pagination {
    pub fn new(limit: u8, offset: u32) -> Self {
        Self { limit, offset }
    }

    pub fn limit(&self) -> u8 {
        self.limit
    }

    pub fn offset(&self) -> u32 {
        self.offset
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            limit: 50,
            offset: 0,
        }
    }
}
