//! Price catalog and user ledger backed by the Cloud Firestore REST API.
//!
//! Collections used:
//!
//! * `recyclable_items/{label}` with `price`, `weight`, and `type`,
//! * `users/{id}` with `name`, `email`, `phone`, `mobile`, `ecopoints`, `wastecollected`,
//! * `users/{id}/wasteHistory/{DOCnnn}` with one document per transaction.

mod value;

use std::collections::HashMap;
use std::env;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use ecospy_core::{
    model::{
        HistoryId, HistoryRecord, IdentityField, MIXED_WASTE_TYPE, PriceEntry, UserId, UserRecord,
    },
    ports::{PortError, PriceCatalogPort, UserStorePort},
};

use crate::value::{Document, Value};

const DEFAULT_BASE_URL: &str = "https://firestore.googleapis.com/v1";
const PRICES: &str = "recyclable_items";
const USERS: &str = "users";
const HISTORY: &str = "wasteHistory";
const HISTORY_PAGE_SIZE: &str = "300";

#[derive(Debug, Clone, Deserialize)]
/// The `[firestore]` configuration table.
pub struct FirestoreSettings {
    /// Google Cloud project id.
    pub project_id: String,
    /// Database id, `(default)` unless configured.
    #[serde(default = "default_database")]
    pub database: String,
    /// API root; point this at the emulator for local runs.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Environment variable holding an OAuth access token, if any.
    #[serde(default)]
    pub access_token_env: Option<String>,
}

fn default_database() -> String {
    String::from("(default)")
}

fn default_base_url() -> String {
    String::from(DEFAULT_BASE_URL)
}

/// Shared REST plumbing for both ports.
struct FirestoreClient {
    client: Client,
    /// `projects/{project}/databases/{database}/documents`
    documents_path: String,
    base_url: String,
    token: Option<String>,
}

impl FirestoreClient {
    fn new(client: Client, settings: &FirestoreSettings) -> Self {
        let token = settings
            .access_token_env
            .as_deref()
            .and_then(|name| env::var(name).ok())
            .filter(|token| !token.trim().is_empty());
        Self {
            client,
            documents_path: format!(
                "projects/{}/databases/{}/documents",
                settings.project_id, settings.database
            ),
            base_url: settings.base_url.trim_end_matches('/').to_owned(),
            token,
        }
    }

    fn url(&self, relative: &str) -> String {
        format!("{}/{}/{relative}", self.base_url, self.documents_path)
    }

    fn document_name(&self, relative: &str) -> String {
        format!("{}/{relative}", self.documents_path)
    }

    fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    /// GET a document; `Ok(None)` on 404.
    async fn get_document(&self, relative: &str) -> Result<Option<Document>, PortError> {
        let resp = self
            .authorize(self.client.get(self.url(relative)))
            .send()
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(resp.error_for_status()?.json().await?))
    }

    async fn run_query(&self, query: &RunQueryRequest) -> Result<Vec<Document>, PortError> {
        let url = format!("{}/{}:runQuery", self.base_url, self.documents_path);
        let rows =
            fetch_json::<Vec<RunQueryRow>>(self.authorize(self.client.post(url).json(query)))
                .await?;
        Ok(rows.into_iter().filter_map(|row| row.document).collect())
    }

    async fn commit(&self, request: &CommitRequest) -> Result<(), PortError> {
        let url = format!("{}/{}:commit", self.base_url, self.documents_path);
        self.authorize(self.client.post(url).json(request))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    /// PATCH a document, creating it if missing. Only `mask` fields are touched when given.
    async fn patch(
        &self,
        relative: &str,
        fields: HashMap<String, Value>,
        mask: Option<&[&str]>,
    ) -> Result<(), PortError> {
        let mut req = self.client.patch(self.url(relative));
        if let Some(mask) = mask {
            for field in mask {
                req = req.query(&[("updateMask.fieldPaths", field)]);
            }
        }
        self.authorize(req.json(&Document::with_fields(fields)))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// Reference prices from the `recyclable_items` collection.
pub struct FirestorePriceCatalog {
    firestore: Arc<FirestoreClient>,
}

#[async_trait]
impl PriceCatalogPort for FirestorePriceCatalog {
    async fn price_entry(&self, label: &str) -> Result<Option<PriceEntry>, PortError> {
        let relative = format!("{PRICES}/{label}");
        let Some(document) = self.firestore.get_document(&relative).await? else {
            debug!(label, "no price document");
            return Ok(None);
        };
        Ok(Some(price_entry_from(&document)))
    }
}

/// Users and their `wasteHistory` sub-collections.
pub struct FirestoreUserStore {
    firestore: Arc<FirestoreClient>,
}

#[async_trait]
impl UserStorePort for FirestoreUserStore {
    async fn find_user(
        &self,
        field: IdentityField,
        value: &str,
    ) -> Result<Option<UserRecord>, PortError> {
        let query = RunQueryRequest::equals(USERS, field.field_name(), value);
        let documents = self.firestore.run_query(&query).await?;
        documents.first().map(user_from).transpose()
    }

    async fn user(&self, id: &UserId) -> Result<UserRecord, PortError> {
        let relative = format!("{USERS}/{id}");
        let document = self
            .firestore
            .get_document(&relative)
            .await?
            .ok_or_else(|| PortError::NotFound(format!("user {id}")))?;
        user_from(&document)
    }

    async fn increment_points(&self, id: &UserId, amount: f64) -> Result<(), PortError> {
        let request = CommitRequest::increment(
            self.firestore.document_name(&format!("{USERS}/{id}")),
            "ecopoints",
            amount,
        );
        self.firestore.commit(&request).await
    }

    async fn set_waste_collected(&self, id: &UserId, total: f64) -> Result<(), PortError> {
        let fields = HashMap::from([(String::from("wastecollected"), Value::DoubleValue(total))]);
        self.firestore
            .patch(&format!("{USERS}/{id}"), fields, Some(["wastecollected"].as_slice()))
            .await
    }

    async fn history_count(&self, id: &UserId) -> Result<usize, PortError> {
        let url = self.firestore.url(&format!("{USERS}/{id}/{HISTORY}"));
        let mut count = 0;
        let mut page_token: Option<String> = None;

        loop {
            let mut req = self.firestore.client.get(&url).query(&[
                ("pageSize", HISTORY_PAGE_SIZE),
                ("mask.fieldPaths", "status"),
            ]);
            if let Some(token) = &page_token {
                req = req.query(&[("pageToken", token)]);
            }
            let page = fetch_json::<ListDocumentsResponse>(self.firestore.authorize(req)).await?;
            count += page.documents.len();

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        Ok(count)
    }

    async fn put_history(
        &self,
        id: &UserId,
        history_id: &HistoryId,
        record: &HistoryRecord,
    ) -> Result<(), PortError> {
        self.firestore
            .patch(
                &format!("{USERS}/{id}/{HISTORY}/{history_id}"),
                history_fields(record),
                None,
            )
            .await
    }
}

/// Build the catalog and user store sharing one HTTP client.
#[must_use]
pub fn ports(
    client: Client,
    settings: &FirestoreSettings,
) -> (Arc<FirestorePriceCatalog>, Arc<FirestoreUserStore>) {
    let firestore = Arc::new(FirestoreClient::new(client, settings));
    (
        Arc::new(FirestorePriceCatalog {
            firestore: Arc::clone(&firestore),
        }),
        Arc::new(FirestoreUserStore { firestore }),
    )
}

fn price_entry_from(document: &Document) -> PriceEntry {
    PriceEntry {
        price: document.number("price").unwrap_or(0.0),
        weight: document.number("weight").unwrap_or(0.0),
        waste_type: document
            .string("type")
            .unwrap_or(MIXED_WASTE_TYPE)
            .to_owned(),
    }
}

fn user_from(document: &Document) -> Result<UserRecord, PortError> {
    let id = document
        .id()
        .ok_or_else(|| PortError::Decode("user document without a name".to_owned()))?;
    let text = |field: &str| document.string(field).map(str::to_owned);

    Ok(UserRecord {
        id: UserId(id.to_owned()),
        name: text("name").unwrap_or_else(|| "Unknown".to_owned()),
        email: text("email"),
        phone: text("phone"),
        // Some records were created with a doubled field name.
        mobile: text("mobile").or_else(|| text("mobilemobile")),
        ecopoints: document.number("ecopoints").unwrap_or(0.0),
        wastecollected: document.number("wastecollected").unwrap_or(0.0),
    })
}

fn history_fields(record: &HistoryRecord) -> HashMap<String, Value> {
    HashMap::from([
        (
            String::from("collectionDate"),
            Value::StringValue(record.collection_date.to_rfc3339()),
        ),
        (
            String::from("location"),
            Value::array([
                Value::DoubleValue(record.location.latitude),
                Value::DoubleValue(record.location.longitude),
            ]),
        ),
        (
            String::from("pointsEarned"),
            Value::DoubleValue(record.points_earned),
        ),
        (
            String::from("status"),
            Value::StringValue(record.status.clone()),
        ),
        (
            String::from("wasteType"),
            Value::StringValue(record.waste_type.clone()),
        ),
        (String::from("weightKg"), Value::DoubleValue(record.weight_kg)),
    ])
}

/// Body of `documents:runQuery`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RunQueryRequest {
    structured_query: StructuredQuery,
}

#[derive(Debug, Serialize)]
struct StructuredQuery {
    from: Vec<CollectionSelector>,
    #[serde(rename = "where")]
    filter: Filter,
    limit: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CollectionSelector {
    collection_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Filter {
    field_filter: FieldFilter,
}

#[derive(Debug, Serialize)]
struct FieldFilter {
    field: FieldReference,
    op: &'static str,
    value: Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FieldReference {
    field_path: String,
}

impl RunQueryRequest {
    fn equals(collection: &str, field: &str, value: &str) -> Self {
        Self {
            structured_query: StructuredQuery {
                from: vec![CollectionSelector {
                    collection_id: collection.to_owned(),
                }],
                filter: Filter {
                    field_filter: FieldFilter {
                        field: FieldReference {
                            field_path: field.to_owned(),
                        },
                        op: "EQUAL",
                        value: Value::StringValue(value.to_owned()),
                    },
                },
                limit: 1,
            },
        }
    }
}

/// One streamed row of a `runQuery` response. Rows without a document carry only
/// progress information.
#[derive(Debug, Deserialize)]
struct RunQueryRow {
    #[serde(default)]
    document: Option<Document>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListDocumentsResponse {
    #[serde(default)]
    documents: Vec<Document>,
    #[serde(default)]
    next_page_token: Option<String>,
}

/// Body of `documents:commit`.
#[derive(Debug, Serialize)]
struct CommitRequest {
    writes: Vec<Write>,
}

#[derive(Debug, Serialize)]
struct Write {
    transform: DocumentTransform,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DocumentTransform {
    document: String,
    field_transforms: Vec<FieldTransform>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FieldTransform {
    field_path: String,
    increment: Value,
}

impl CommitRequest {
    fn increment(document: String, field: &str, amount: f64) -> Self {
        Self {
            writes: vec![Write {
                transform: DocumentTransform {
                    document,
                    field_transforms: vec![FieldTransform {
                        field_path: field.to_owned(),
                        increment: Value::DoubleValue(amount),
                    }],
                },
            }],
        }
    }
}

// Small helper to fetch and decode JSON with status handling.
async fn fetch_json<T: DeserializeOwned>(req: RequestBuilder) -> Result<T, PortError> {
    req.send()
        .await
        .map_err(PortError::from)?
        .error_for_status()
        .map_err(PortError::from)?
        .json()
        .await
        .map_err(PortError::from)
}

#[cfg(test)]
mod tests {
    use axum::{
        Json, Router,
        extract::Query,
        http::StatusCode as ServerStatus,
        response::{IntoResponse, Response},
    };
    use chrono::{TimeZone, Utc};
    use ecospy_core::model::GeoPoint;
    use serde_json::json;
    use tokio::net::TcpListener;

    use super::*;

    fn settings(base_url: String) -> FirestoreSettings {
        FirestoreSettings {
            project_id: "kiosk".to_owned(),
            database: default_database(),
            base_url,
            access_token_env: None,
        }
    }

    /// Serve `router` on a free local port and point the settings at it.
    async fn serve(router: Router) -> FirestoreSettings {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move { axum::serve(listener, router).await });
        settings(format!("http://{addr}/v1"))
    }

    /// Two pages of history, answering only requests that ask for the `status` mask.
    async fn history_pages(Query(params): Query<HashMap<String, String>>) -> Response {
        if params.get("mask.fieldPaths").map(String::as_str) != Some("status") {
            return ServerStatus::BAD_REQUEST.into_response();
        }
        let page = match params.get("pageToken").map(String::as_str) {
            None => json!({
                "documents": [{ "name": "DOC001" }, { "name": "DOC002" }],
                "nextPageToken": "page-2"
            }),
            Some("page-2") => json!({
                "documents": [{ "name": "DOC003" }],
                "nextPageToken": ""
            }),
            Some(_) => return ServerStatus::BAD_REQUEST.into_response(),
        };
        Json(page).into_response()
    }

    fn document(raw: &serde_json::Value) -> Document {
        serde_json::from_value(raw.clone()).expect("valid document")
    }

    #[test]
    fn price_entry_reads_numbers_and_type() {
        let doc = document(&json!({
            "name": "projects/p/databases/(default)/documents/recyclable_items/bottle",
            "fields": {
                "price": { "integerValue": "2" },
                "weight": { "doubleValue": 0.05 },
                "type": { "stringValue": "Plastic" }
            }
        }));

        let entry = price_entry_from(&doc);
        assert!((entry.price - 2.0).abs() < f64::EPSILON, "integer price");
        assert!((entry.weight - 0.05).abs() < f64::EPSILON, "double weight");
        assert_eq!(entry.waste_type, "Plastic");
    }

    #[test]
    fn price_entry_defaults_missing_fields() {
        let doc = document(&json!({
            "name": "projects/p/databases/(default)/documents/recyclable_items/can",
            "fields": {}
        }));

        let entry = price_entry_from(&doc);
        assert!(entry.price.abs() < f64::EPSILON, "price defaults to zero");
        assert!(entry.weight.abs() < f64::EPSILON, "weight defaults to zero");
        assert_eq!(entry.waste_type, MIXED_WASTE_TYPE);
    }

    #[test]
    fn user_reads_doubled_mobile_field() {
        let doc = document(&json!({
            "name": "projects/p/databases/(default)/documents/users/abc123",
            "fields": {
                "name": { "stringValue": "Asha" },
                "email": { "stringValue": "asha@example.com" },
                "mobilemobile": { "stringValue": "9876543210" },
                "ecopoints": { "integerValue": "12" },
                "wastecollected": { "doubleValue": 1.25 },
                "joined": { "timestampValue": "2024-01-01T00:00:00Z" }
            }
        }));

        let user = user_from(&doc).expect("decodes");
        assert_eq!(user.id, UserId("abc123".to_owned()));
        assert_eq!(user.mobile.as_deref(), Some("9876543210"));
        assert_eq!(user.phone, None);
        assert!((user.ecopoints - 12.0).abs() < f64::EPSILON, "integer points");
        assert!((user.wastecollected - 1.25).abs() < f64::EPSILON, "double weight");
    }

    #[test]
    fn query_body_matches_firestore_shape() {
        let body = serde_json::to_value(RunQueryRequest::equals("users", "phone", "555"))
            .expect("serializes");

        assert_eq!(
            body,
            json!({
                "structuredQuery": {
                    "from": [{ "collectionId": "users" }],
                    "where": {
                        "fieldFilter": {
                            "field": { "fieldPath": "phone" },
                            "op": "EQUAL",
                            "value": { "stringValue": "555" }
                        }
                    },
                    "limit": 1
                }
            })
        );
    }

    #[test]
    fn increment_body_uses_field_transform() {
        let body = serde_json::to_value(CommitRequest::increment(
            "projects/p/databases/(default)/documents/users/u1".to_owned(),
            "ecopoints",
            0.5,
        ))
        .expect("serializes");

        assert_eq!(
            body,
            json!({
                "writes": [{
                    "transform": {
                        "document": "projects/p/databases/(default)/documents/users/u1",
                        "fieldTransforms": [{
                            "fieldPath": "ecopoints",
                            "increment": { "doubleValue": 0.5 }
                        }]
                    }
                }]
            })
        );
    }

    #[test]
    fn history_fields_use_store_names() {
        let record = HistoryRecord {
            collection_date: Utc
                .with_ymd_and_hms(2025, 3, 1, 9, 30, 0)
                .single()
                .expect("valid timestamp"),
            location: GeoPoint {
                latitude: 28.61,
                longitude: 77.2,
            },
            points_earned: 0.2,
            status: "Recycled".to_owned(),
            waste_type: "Plastic".to_owned(),
            weight_kg: 0.1,
        };

        let body = serde_json::to_value(Document::with_fields(history_fields(&record)))
            .expect("serializes");

        assert_eq!(
            body,
            json!({
                "fields": {
                    "collectionDate": { "stringValue": "2025-03-01T09:30:00+00:00" },
                    "location": { "arrayValue": { "values": [
                        { "doubleValue": 28.61 },
                        { "doubleValue": 77.2 }
                    ] } },
                    "pointsEarned": { "doubleValue": 0.2 },
                    "status": { "stringValue": "Recycled" },
                    "wasteType": { "stringValue": "Plastic" },
                    "weightKg": { "doubleValue": 0.1 }
                }
            })
        );
    }

    #[test]
    fn settings_default_to_public_endpoint() {
        let settings = FirestoreSettings {
            project_id: "ecospy-demo".to_owned(),
            database: default_database(),
            base_url: default_base_url(),
            access_token_env: None,
        };
        let firestore = FirestoreClient::new(Client::new(), &settings);

        assert_eq!(
            firestore.url("users/u1"),
            "https://firestore.googleapis.com/v1/projects/ecospy-demo/databases/(default)/documents/users/u1"
        );
    }

    #[tokio::test]
    async fn missing_documents_read_as_absent() {
        let settings = serve(Router::new().fallback(|| async { ServerStatus::NOT_FOUND })).await;
        let (catalog, store) = ports(Client::new(), &settings);

        let price = catalog.price_entry("bottle").await.expect("404 is not an error");
        assert!(price.is_none());

        let user = store.user(&UserId("ghost".to_owned())).await;
        assert!(matches!(user, Err(PortError::NotFound(_))));
    }

    #[tokio::test]
    async fn history_count_follows_page_tokens() {
        let settings = serve(Router::new().fallback(history_pages)).await;
        let (_, store) = ports(Client::new(), &settings);

        let count = store
            .history_count(&UserId("u1".to_owned()))
            .await
            .expect("both pages listed");

        assert_eq!(count, 3);
    }

    #[tokio::test]
    async fn refused_writes_are_untouched_but_server_errors_are_not() {
        let refused = serve(Router::new().fallback(|| async { ServerStatus::BAD_REQUEST })).await;
        let (_, store) = ports(Client::new(), &refused);
        let err = store
            .increment_points(&UserId("u1".to_owned()), 1.0)
            .await
            .expect_err("400");
        assert!(err.left_store_untouched(), "{err}");

        let unavailable =
            serve(Router::new().fallback(|| async { ServerStatus::SERVICE_UNAVAILABLE })).await;
        let (_, store) = ports(Client::new(), &unavailable);
        let err = store
            .increment_points(&UserId("u1".to_owned()), 1.0)
            .await
            .expect_err("503");
        assert!(!err.left_store_untouched(), "{err}");
    }

    #[tokio::test]
    async fn closed_port_is_a_connect_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        drop(listener);
        let (_, store) = ports(Client::new(), &settings(format!("http://{addr}/v1")));

        let err = store
            .increment_points(&UserId("u1".to_owned()), 1.0)
            .await
            .expect_err("nothing listening");

        assert!(err.left_store_untouched(), "{err}");
    }
}
