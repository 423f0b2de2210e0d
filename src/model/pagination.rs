use rocket::{
    http::Status,
    request::{self, FromRequest, Request},
};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Page size used when the request does not name one.
pub const DEFAULT_PAGE_SIZE: u32 = 50;
/// Largest page a client may request.
pub const MAX_PAGE_SIZE: u32 = 500;

/// Which page of a result set to return, read from the `page_num` (1-based)
/// and `page_size` query parameters.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Pagination {
    page_num: u32,
    page_size: u32,
}

impl Pagination {
    /// Validate a page request.
    pub fn new(page_num: u32, page_size: u32) -> Result<Self, Error> {
        if page_num == 0 {
            return Err(Error::BadRequest("page_num starts at 1".to_string()));
        }
        if page_size == 0 || page_size > MAX_PAGE_SIZE {
            return Err(Error::BadRequest(format!(
                "page_size must be between 1 and {MAX_PAGE_SIZE}"
            )));
        }
        Ok(Self {
            page_num,
            page_size,
        })
    }

    pub fn page_num(&self) -> u32 {
        self.page_num
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Number of items before this page.
    pub fn skip(&self) -> u64 {
        u64::from(self.page_num - 1) * u64::from(self.page_size)
    }

    pub fn result(self, total: u64) -> PaginationResult {
        PaginationResult {
            page_num: self.page_num,
            page_size: self.page_size,
            total,
        }
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page_num: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for Pagination {
    type Error = Error;

    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        let page_num = match req.query_value::<u32>("page_num").unwrap_or(Ok(1)) {
            Ok(page_num) => page_num,
            Err(_) => {
                return request::Outcome::Failure((
                    Status::BadRequest,
                    Error::BadRequest("page_num is not a number".to_string()),
                ))
            }
        };
        let page_size = match req
            .query_value::<u32>("page_size")
            .unwrap_or(Ok(DEFAULT_PAGE_SIZE))
        {
            Ok(page_size) => page_size,
            Err(_) => {
                return request::Outcome::Failure((
                    Status::BadRequest,
                    Error::BadRequest("page_size is not a number".to_string()),
                ))
            }
        };
        match Self::new(page_num, page_size) {
            Ok(pagination) => request::Outcome::Success(pagination),
            Err(e) => request::Outcome::Failure((Status::BadRequest, e)),
        }
    }
}

/// Where a page sits in the full result set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationResult {
    pub page_num: u32,
    pub page_size: u32,
    pub total: u64,
}

/// One page of items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub pagination: PaginationResult,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skip() {
        assert_eq!(Pagination::default().skip(), 0);
        assert_eq!(Pagination::new(3, 20).unwrap().skip(), 40);
    }

    #[test]
    fn rejects_out_of_range() {
        assert!(Pagination::new(0, 10).is_err());
        assert!(Pagination::new(1, 0).is_err());
        assert!(Pagination::new(1, MAX_PAGE_SIZE + 1).is_err());
        assert!(Pagination::new(1, MAX_PAGE_SIZE).is_ok());
    }

    #[test]
    fn result() {
        let result = Pagination::new(2, 10).unwrap().result(15);
        assert_eq!(
            result,
            PaginationResult {
                page_num: 2,
                page_size: 10,
                total: 15,
            }
        );
    }
}
