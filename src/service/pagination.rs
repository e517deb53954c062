//! Paginated list queries: count ignoring pagination, then the page slice.

use crate::extractors::lenient;
use crate::response::{master_list, success_flat, PaginationMeta};
use crate::store::{validate_field, Document, DocumentStore, Filter, ListQuery, SortOrder};
use crate::error::StoreError;
use axum::{http::StatusCode, Json};
use serde::Deserialize;
use serde_json::{json, Value};

/// What a list endpoint exposes for one doctype.
#[derive(Clone, Copy, Debug)]
pub struct ListSpec {
    pub doctype: &'static str,
    /// Projected fields; empty returns whole documents.
    pub fields: &'static [&'static str],
    /// Each gets a `%term%` OR-filter when a search term is given.
    pub search_fields: &'static [&'static str],
    /// Accepted `sort_by` values; empty accepts any plain field name.
    pub sort_fields: &'static [&'static str],
    pub default_sort: &'static str,
    pub default_order: SortOrder,
    pub default_page_size: i64,
}

impl ListSpec {
    /// Transactional-list defaults: `modified desc`, 10 per page.
    pub const fn new(doctype: &'static str, fields: &'static [&'static str]) -> Self {
        ListSpec {
            doctype,
            fields,
            search_fields: &[],
            sort_fields: &[],
            default_sort: "modified",
            default_order: SortOrder::Desc,
            default_page_size: 10,
        }
    }

    pub const fn search(mut self, fields: &'static [&'static str]) -> Self {
        self.search_fields = fields;
        self
    }

    pub const fn sort(mut self, allowed: &'static [&'static str], default: &'static str, order: SortOrder) -> Self {
        self.sort_fields = allowed;
        self.default_sort = default;
        self.default_order = order;
        self
    }

    pub const fn page_size(mut self, n: i64) -> Self {
        self.default_page_size = n;
        self
    }

    fn sorts_on(&self, field: &str) -> bool {
        if self.sort_fields.is_empty() {
            validate_field(field).is_ok()
        } else {
            self.sort_fields.contains(&field)
        }
    }

    fn resolve_sort(&self, req: &PageRequest) -> (String, SortOrder) {
        let field = req
            .sort_by
            .as_deref()
            .map(str::trim)
            .filter(|f| self.sorts_on(f))
            .unwrap_or(self.default_sort);
        let order = req
            .sort_order
            .as_deref()
            .map(SortOrder::parse)
            .unwrap_or(self.default_order);
        (field.to_string(), order)
    }

    /// OR-filters for a search term. Blank terms add nothing.
    pub fn search_filters(&self, search: Option<&str>) -> Vec<Filter> {
        match search.map(str::trim).filter(|s| !s.is_empty()) {
            Some(term) => self
                .search_fields
                .iter()
                .map(|f| Filter::contains_text(*f, term))
                .collect(),
            None => Vec::new(),
        }
    }
}

/// Page, size, search and sort parameters. Flatten into endpoint parameter structs.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct PageRequest {
    #[serde(default, deserialize_with = "lenient::opt_i64")]
    pub page: Option<i64>,
    #[serde(default, deserialize_with = "lenient::opt_i64")]
    pub page_size: Option<i64>,
    #[serde(default, deserialize_with = "lenient::opt_text")]
    pub search: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_text")]
    pub sort_by: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_text")]
    pub sort_order: Option<String>,
}

/// Equality filters for the parameters that were given; blank values add nothing.
pub fn eq_filters(pairs: &[(&str, Option<&str>)]) -> Vec<Filter> {
    pairs
        .iter()
        .filter_map(|(field, value)| {
            value
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(|v| Filter::eq(*field, v))
        })
        .collect()
}

/// `ceil(total / page_size)`; a non-positive page size means one page holding everything.
pub fn total_pages(total: u64, page_size: i64) -> u64 {
    if page_size <= 0 {
        u64::from(total > 0)
    } else {
        let size = page_size as u64;
        (total + size - 1) / size
    }
}

#[derive(Clone, Debug)]
pub struct Page {
    pub page: i64,
    pub page_size: i64,
    pub total: u64,
    pub total_pages: u64,
    pub results: Vec<Document>,
}

impl Page {
    pub fn next_page(&self) -> Option<i64> {
        ((self.page as u64) < self.total_pages).then_some(self.page + 1)
    }

    pub fn prev_page(&self) -> Option<i64> {
        (self.page > 1).then_some(self.page - 1)
    }

    /// Rows projected to `fields`, or whole documents when `fields` is empty.
    pub fn rows(&self, fields: &[&str]) -> Vec<Value> {
        self.results
            .iter()
            .map(|d| if fields.is_empty() { d.to_value() } else { d.project(fields) })
            .collect()
    }

    /// Flattened `{page, page_size, total, total_pages, next_page, prev_page, data}`.
    pub fn transactional(&self, data: Vec<Value>, message: &str) -> (StatusCode, Json<Value>) {
        success_flat(
            json!({
                "page": self.page,
                "page_size": self.page_size,
                "total": self.total,
                "total_pages": self.total_pages,
                "next_page": self.next_page(),
                "prev_page": self.prev_page(),
                "data": data,
            }),
            message,
        )
    }

    /// `{status, message, pagination: {page, page_size, total_records, total_pages}, data}`.
    pub fn master(&self, data: Vec<Value>, message: &str) -> Result<(StatusCode, Json<Value>), serde_json::Error> {
        master_list(data, Some(self.meta()), message)
    }

    pub fn meta(&self) -> PaginationMeta {
        PaginationMeta {
            page: self.page,
            page_size: self.page_size,
            total_records: self.total,
            total_pages: self.total_pages,
        }
    }
}

/// Count every match, then read the requested page. `filters` are ANDed with the search OR-group.
pub async fn fetch_page(
    store: &dyn DocumentStore,
    spec: &ListSpec,
    req: &PageRequest,
    filters: Vec<Filter>,
) -> Result<Page, StoreError> {
    let page = req.page.unwrap_or(1).max(1);
    let page_size = req.page_size.unwrap_or(spec.default_page_size);
    let or_filters = spec.search_filters(req.search.as_deref());
    let (sort_field, order) = spec.resolve_sort(req);

    let total = store.count(spec.doctype, &filters, &or_filters).await?;
    let mut query = ListQuery::new(spec.doctype)
        .fields(spec.fields)
        .filters(filters)
        .or_filters(or_filters)
        .order_by(sort_field, order);
    let results = if page_size <= 0 {
        store.list(&query).await?
    } else {
        match (page - 1).checked_mul(page_size) {
            Some(start) => {
                query = query.page(start as u64, page_size as u64);
                store.list(&query).await?
            }
            // Past any addressable row.
            None => Vec::new(),
        }
    };
    Ok(Page {
        page,
        page_size,
        total,
        total_pages: total_pages(total, page_size),
        results,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryDocumentStore, NewDocument};
    use serde_json::{json, Map};

    const CUSTOMERS: ListSpec = ListSpec::new("Customer", &["name", "customer_name", "territory"])
        .search(&["customer_name", "territory"])
        .sort(&["customer_name", "name"], "customer_name", SortOrder::Asc)
        .page_size(20);

    async fn seeded() -> MemoryDocumentStore {
        let store = MemoryDocumentStore::new();
        for (name, territory) in [
            ("Acme", "India"),
            ("Globex", "India"),
            ("Initech", "Rest Of The World"),
            ("Umbrella", "India"),
            ("Hooli", "Rest Of The World"),
        ] {
            let mut fields = Map::new();
            fields.insert("customer_name".into(), json!(name));
            fields.insert("territory".into(), json!(territory));
            store.insert(NewDocument::new("Customer", "Administrator", fields)).await.unwrap();
        }
        store
    }

    fn req(page: i64, page_size: i64) -> PageRequest {
        PageRequest {
            page: Some(page),
            page_size: Some(page_size),
            ..PageRequest::default()
        }
    }

    #[test]
    fn total_pages_is_ceiling_division() {
        assert_eq!(total_pages(0, 10), 0);
        assert_eq!(total_pages(10, 10), 1);
        assert_eq!(total_pages(11, 10), 2);
        assert_eq!(total_pages(7, 0), 1);
        assert_eq!(total_pages(0, -1), 0);
    }

    #[tokio::test]
    async fn pages_slice_from_offset() {
        let store = seeded().await;
        let page = fetch_page(&store, &CUSTOMERS, &req(3, 2), vec![]).await.unwrap();
        assert_eq!(page.total, 5);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.results.len(), 1);
        assert_eq!(page.results[0].name, "Umbrella");
        assert_eq!(page.next_page(), None);
        assert_eq!(page.prev_page(), Some(2));
    }

    #[tokio::test]
    async fn page_below_one_is_first_page() {
        let store = seeded().await;
        let page = fetch_page(&store, &CUSTOMERS, &req(-4, 2), vec![]).await.unwrap();
        assert_eq!(page.page, 1);
        assert_eq!(page.rows(CUSTOMERS.fields)[0]["customer_name"], "Acme");
    }

    #[tokio::test]
    async fn huge_page_number_is_an_empty_page() {
        let store = seeded().await;
        let page = fetch_page(&store, &CUSTOMERS, &req(i64::MAX, 10), vec![]).await.unwrap();
        assert_eq!(page.total, 5);
        assert!(page.results.is_empty());
        assert_eq!(page.next_page(), None);
        assert_eq!(page.prev_page(), Some(i64::MAX - 1));
    }

    #[tokio::test]
    async fn non_positive_page_size_returns_everything() {
        let store = seeded().await;
        let page = fetch_page(&store, &CUSTOMERS, &req(1, 0), vec![]).await.unwrap();
        assert_eq!(page.results.len(), 5);
        assert_eq!(page.total_pages, 1);
    }

    #[tokio::test]
    async fn search_or_group_is_anded_with_filters() {
        let store = seeded().await;
        let mut r = req(1, 20);
        r.search = Some("  rest ".into());
        let page = fetch_page(&store, &CUSTOMERS, &r, vec![]).await.unwrap();
        assert_eq!(page.total, 2);

        let page = fetch_page(&store, &CUSTOMERS, &r, vec![Filter::eq("customer_name", "Hooli")]).await.unwrap();
        assert_eq!(page.total, 1);

        r.search = Some("   ".into());
        let page = fetch_page(&store, &CUSTOMERS, &r, vec![]).await.unwrap();
        assert_eq!(page.total, 5);
    }

    #[tokio::test]
    async fn unknown_sort_falls_back_to_default() {
        let store = seeded().await;
        let mut r = req(1, 20);
        r.sort_by = Some("territory; drop table".into());
        r.sort_order = Some("DESC".into());
        let page = fetch_page(&store, &CUSTOMERS, &r, vec![]).await.unwrap();
        let names: Vec<_> = page.results.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, ["Umbrella", "Initech", "Hooli", "Globex", "Acme"]);
    }

    #[tokio::test]
    async fn envelopes_carry_pagination() {
        let store = seeded().await;
        let page = fetch_page(&store, &CUSTOMERS, &req(1, 2), vec![]).await.unwrap();
        let (_, Json(body)) = page.transactional(page.rows(CUSTOMERS.fields), "Customers fetched");
        assert_eq!(body["total"], 5);
        assert_eq!(body["next_page"], 2);
        assert!(body["prev_page"].is_null());
        assert_eq!(body["data"].as_array().unwrap().len(), 2);

        let (_, Json(body)) = page.master(page.rows(&["name"]), "Customer List Fetched Successfully").unwrap();
        assert_eq!(body["pagination"]["total_records"], 5);
        assert_eq!(body["pagination"]["total_pages"], 3);
    }
}
