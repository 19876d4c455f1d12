//! In-memory stand-in for the Mailchimp Marketing API v3.
//!
//! Covers the list-member, tag, activity and campaign resources the
//! newsletter client talks to, with Mailchimp's problem-document error shape.

use std::{collections::HashMap, sync::Arc};

use axum::{
    extract::{Path, Query, Request, State},
    http::{header::AUTHORIZATION, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio::{net::TcpListener, sync::RwLock};
use uuid::Uuid;

const MEMBER_STATUSES: &[&str] = &["subscribed", "unsubscribed", "cleaned", "pending", "transactional"];
const CAMPAIGN_TYPES: &[&str] = &["regular", "plaintext", "absplit", "rss", "variate"];

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Member {
    pub id: String,
    pub email_address: String,
    pub status: String,
    pub email_type: String,
    #[serde(default)]
    pub merge_fields: Map<String, Value>,
    pub list_id: String,
    #[serde(default)]
    pub tags: Vec<Tag>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub action: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Campaign {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub status: String,
    pub recipients: Value,
    #[serde(default)]
    pub settings: Value,
}

#[derive(Default)]
struct MailingList {
    members: Vec<Member>,
    activity: HashMap<String, Vec<Activity>>,
}

impl MailingList {
    fn position(&self, hash: &str) -> Option<usize> {
        self.members.iter().position(|m| m.id == hash)
    }

    fn record(&mut self, hash: &str, action: &str) {
        self.activity.entry(hash.to_string()).or_default().push(Activity {
            action: action.to_string(),
        });
    }
}

#[derive(Default)]
pub struct Store {
    lists: HashMap<String, MailingList>,
    campaigns: HashMap<String, Campaign>,
    content: HashMap<String, Value>,
}

pub type Db = Arc<RwLock<Store>>;

/// Mailchimp's member id: MD5 of the address with ASCII letters lowercased.
pub fn subscriber_hash(email: &str) -> String {
    hex::encode(Md5::digest(email.to_ascii_lowercase().as_bytes()))
}

/// Error body in Mailchimp's problem-document shape.
#[derive(Debug)]
pub struct ApiProblem {
    status: StatusCode,
    title: &'static str,
    detail: String,
}

impl ApiProblem {
    fn new(status: StatusCode, title: &'static str, detail: impl Into<String>) -> Self {
        Self {
            status,
            title,
            detail: detail.into(),
        }
    }

    fn not_found() -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            "Resource Not Found",
            "The requested resource could not be found.",
        )
    }

    fn invalid(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "Invalid Resource", detail)
    }
}

impl IntoResponse for ApiProblem {
    fn into_response(self) -> Response {
        let body = json!({
            "type": "https://mailchimp.com/developer/marketing/docs/errors/",
            "title": self.title,
            "status": self.status.as_u16(),
            "detail": self.detail,
            "instance": Uuid::new_v4().to_string(),
        });
        (self.status, Json(body)).into_response()
    }
}

/// Router with the given list ids seeded as empty audiences.
pub fn app(list_ids: &[&str]) -> Router {
    let mut store = Store::default();
    for id in list_ids {
        store.lists.insert(id.to_string(), MailingList::default());
    }
    let db: Db = Arc::new(RwLock::new(store));

    let api = Router::new()
        .route("/lists/{list_id}/members", get(list_members).post(create_member))
        .route(
            "/lists/{list_id}/members/{hash}",
            get(get_member)
                .put(upsert_member)
                .patch(update_member)
                .delete(archive_member),
        )
        .route("/lists/{list_id}/members/{hash}/activity", get(member_activity))
        .route(
            "/lists/{list_id}/members/{hash}/tags",
            get(member_tags).post(update_member_tags),
        )
        .route(
            "/lists/{list_id}/members/{hash}/actions/delete-permanent",
            post(delete_member_permanently),
        )
        .route("/campaigns", post(create_campaign))
        .route("/campaigns/{campaign_id}", get(get_campaign))
        .route(
            "/campaigns/{campaign_id}/content",
            put(set_campaign_content).get(get_campaign_content),
        )
        .layer(middleware::from_fn(require_api_key))
        .with_state(db);

    Router::new().nest("/3.0", api)
}

pub async fn run(listener: TcpListener, list_ids: &[&str]) -> Result<(), std::io::Error> {
    axum::serve(listener, app(list_ids)).await
}

async fn require_api_key(request: Request, next: Next) -> Response {
    let authorized = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("apikey "))
        .is_some_and(|key| !key.trim().is_empty());
    if !authorized {
        return ApiProblem::new(
            StatusCode::UNAUTHORIZED,
            "API Key Invalid",
            "Your API key may be invalid, or you've attempted to access the wrong datacenter.",
        )
        .into_response();
    }
    next.run(request).await
}

#[derive(Debug, Deserialize)]
pub struct MembersQuery {
    pub count: Option<usize>,
    pub offset: Option<usize>,
    pub status: Option<String>,
}

async fn list_members(
    State(db): State<Db>,
    Path(list_id): Path<String>,
    Query(query): Query<MembersQuery>,
) -> Result<Json<Value>, ApiProblem> {
    let store = db.read().await;
    let list = store.lists.get(&list_id).ok_or_else(ApiProblem::not_found)?;
    let matching: Vec<&Member> = list
        .members
        .iter()
        .filter(|m| query.status.as_deref().map_or(true, |s| m.status == s))
        .collect();
    let page: Vec<&Member> = matching
        .iter()
        .skip(query.offset.unwrap_or(0))
        .take(query.count.unwrap_or(10))
        .copied()
        .collect();
    Ok(Json(json!({
        "members": page,
        "list_id": list_id,
        "total_items": matching.len(),
    })))
}

async fn create_member(
    State(db): State<Db>,
    Path(list_id): Path<String>,
    Json(input): Json<Value>,
) -> Result<Json<Member>, ApiProblem> {
    let email = email_address(&input)?;
    let status = member_status(input.get("status"))?
        .ok_or_else(|| ApiProblem::invalid("Your request is missing a member status."))?;

    let mut store = db.write().await;
    let list = store.lists.get_mut(&list_id).ok_or_else(ApiProblem::not_found)?;
    let hash = subscriber_hash(&email);
    if list.position(&hash).is_some() {
        return Err(ApiProblem::new(
            StatusCode::BAD_REQUEST,
            "Member Exists",
            format!("{email} is already a list member. Use PUT to insert or update list members."),
        ));
    }

    let member = Member {
        id: hash.clone(),
        email_address: email,
        status: status.clone(),
        email_type: input
            .get("email_type")
            .and_then(Value::as_str)
            .unwrap_or("html")
            .to_string(),
        merge_fields: merge_fields(&input),
        list_id,
        tags: Vec::new(),
    };
    list.members.push(member.clone());
    list.record(&hash, &status);
    tracing::debug!(member = %hash, "member created");
    Ok(Json(member))
}

async fn get_member(
    State(db): State<Db>,
    Path((list_id, hash)): Path<(String, String)>,
) -> Result<Json<Member>, ApiProblem> {
    let store = db.read().await;
    let list = store.lists.get(&list_id).ok_or_else(ApiProblem::not_found)?;
    let i = list.position(&hash).ok_or_else(ApiProblem::not_found)?;
    Ok(Json(list.members[i].clone()))
}

async fn upsert_member(
    State(db): State<Db>,
    Path((list_id, hash)): Path<(String, String)>,
    Json(input): Json<Value>,
) -> Result<Json<Member>, ApiProblem> {
    let email = email_address(&input)?;
    if subscriber_hash(&email) != hash {
        return Err(ApiProblem::invalid(
            "The email address does not match the subscriber hash in the URL.",
        ));
    }
    let status = member_status(input.get("status"))?;
    let status_if_new = member_status(input.get("status_if_new"))?;

    let mut store = db.write().await;
    let list = store.lists.get_mut(&list_id).ok_or_else(ApiProblem::not_found)?;

    match list.position(&hash) {
        Some(i) => {
            apply_changes(&mut list.members[i], &input, status.clone());
            let member = list.members[i].clone();
            if let Some(status) = status {
                list.record(&hash, &status);
            }
            Ok(Json(member))
        }
        None => {
            let status = status_if_new
                .or(status)
                .ok_or_else(|| ApiProblem::invalid("Your request is missing a member status."))?;
            let member = Member {
                id: hash.clone(),
                email_address: email,
                status: status.clone(),
                email_type: input
                    .get("email_type")
                    .and_then(Value::as_str)
                    .unwrap_or("html")
                    .to_string(),
                merge_fields: merge_fields(&input),
                list_id,
                tags: Vec::new(),
            };
            list.members.push(member.clone());
            list.record(&hash, &status);
            Ok(Json(member))
        }
    }
}

async fn update_member(
    State(db): State<Db>,
    Path((list_id, hash)): Path<(String, String)>,
    Json(input): Json<Value>,
) -> Result<Json<Member>, ApiProblem> {
    let status = member_status(input.get("status"))?;

    let mut store = db.write().await;
    let list = store.lists.get_mut(&list_id).ok_or_else(ApiProblem::not_found)?;
    let i = list.position(&hash).ok_or_else(ApiProblem::not_found)?;

    let mut id = hash;
    if let Some(new_email) = input.get("email_address").and_then(Value::as_str) {
        let new_hash = subscriber_hash(new_email);
        if new_hash != id && list.position(&new_hash).is_some() {
            return Err(ApiProblem::new(
                StatusCode::BAD_REQUEST,
                "Member Exists",
                format!("{new_email} is already a list member."),
            ));
        }
        let member = &mut list.members[i];
        member.email_address = new_email.to_string();
        member.id = new_hash.clone();
        if let Some(history) = list.activity.remove(&id) {
            list.activity.insert(new_hash.clone(), history);
        }
        id = new_hash;
    }

    apply_changes(&mut list.members[i], &input, status.clone());
    if let Some(status) = status {
        list.record(&id, &status);
    }
    Ok(Json(list.members[i].clone()))
}

async fn archive_member(
    State(db): State<Db>,
    Path((list_id, hash)): Path<(String, String)>,
) -> Result<StatusCode, ApiProblem> {
    let mut store = db.write().await;
    let list = store.lists.get_mut(&list_id).ok_or_else(ApiProblem::not_found)?;
    let i = list.position(&hash).ok_or_else(ApiProblem::not_found)?;
    list.members[i].status = "archived".to_string();
    list.record(&hash, "archive");
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_member_permanently(
    State(db): State<Db>,
    Path((list_id, hash)): Path<(String, String)>,
) -> Result<StatusCode, ApiProblem> {
    let mut store = db.write().await;
    let list = store.lists.get_mut(&list_id).ok_or_else(ApiProblem::not_found)?;
    let i = list.position(&hash).ok_or_else(ApiProblem::not_found)?;
    list.members.remove(i);
    list.activity.remove(&hash);
    Ok(StatusCode::NO_CONTENT)
}

async fn member_activity(
    State(db): State<Db>,
    Path((list_id, hash)): Path<(String, String)>,
) -> Result<Json<Value>, ApiProblem> {
    let store = db.read().await;
    let list = store.lists.get(&list_id).ok_or_else(ApiProblem::not_found)?;
    list.position(&hash).ok_or_else(ApiProblem::not_found)?;
    let activity = list.activity.get(&hash).cloned().unwrap_or_default();
    Ok(Json(json!({
        "activity": activity,
        "email_id": hash,
        "list_id": list_id,
        "total_items": activity.len(),
    })))
}

async fn member_tags(
    State(db): State<Db>,
    Path((list_id, hash)): Path<(String, String)>,
) -> Result<Json<Value>, ApiProblem> {
    let store = db.read().await;
    let list = store.lists.get(&list_id).ok_or_else(ApiProblem::not_found)?;
    let i = list.position(&hash).ok_or_else(ApiProblem::not_found)?;
    let tags = &list.members[i].tags;
    Ok(Json(json!({ "tags": tags, "total_items": tags.len() })))
}

#[derive(Debug, Deserialize)]
pub struct TagUpdate {
    pub name: String,
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct TagsBody {
    pub tags: Vec<TagUpdate>,
}

async fn update_member_tags(
    State(db): State<Db>,
    Path((list_id, hash)): Path<(String, String)>,
    Json(body): Json<TagsBody>,
) -> Result<StatusCode, ApiProblem> {
    let mut store = db.write().await;
    let list = store.lists.get_mut(&list_id).ok_or_else(ApiProblem::not_found)?;
    let i = list.position(&hash).ok_or_else(ApiProblem::not_found)?;
    let tags = &mut list.members[i].tags;
    for update in body.tags {
        match update.status.as_str() {
            "active" => {
                if !tags.iter().any(|t| t.name == update.name) {
                    tags.push(Tag { name: update.name });
                }
            }
            "inactive" => tags.retain(|t| t.name != update.name),
            other => {
                return Err(ApiProblem::invalid(format!(
                    "`{other}` is not a valid tag status."
                )))
            }
        }
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn create_campaign(
    State(db): State<Db>,
    Json(input): Json<Value>,
) -> Result<Json<Campaign>, ApiProblem> {
    let kind = input
        .get("type")
        .and_then(Value::as_str)
        .filter(|t| CAMPAIGN_TYPES.contains(t))
        .ok_or_else(|| ApiProblem::invalid("The campaign type is missing or invalid."))?;

    let mut store = db.write().await;
    let recipients = input.get("recipients").cloned().unwrap_or(Value::Null);
    let list_known = recipients
        .get("list_id")
        .and_then(Value::as_str)
        .is_some_and(|id| store.lists.contains_key(id));
    if !list_known {
        return Err(ApiProblem::invalid("recipients.list_id: The resource submitted could not be validated."));
    }

    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(10);
    let campaign = Campaign {
        id: id.clone(),
        kind: kind.to_string(),
        status: "save".to_string(),
        recipients,
        settings: input.get("settings").cloned().unwrap_or_else(|| json!({})),
    };
    store.campaigns.insert(id, campaign.clone());
    Ok(Json(campaign))
}

async fn get_campaign(
    State(db): State<Db>,
    Path(campaign_id): Path<String>,
) -> Result<Json<Campaign>, ApiProblem> {
    let store = db.read().await;
    store
        .campaigns
        .get(&campaign_id)
        .cloned()
        .map(Json)
        .ok_or_else(ApiProblem::not_found)
}

async fn set_campaign_content(
    State(db): State<Db>,
    Path(campaign_id): Path<String>,
    Json(input): Json<Value>,
) -> Result<Json<Value>, ApiProblem> {
    let mut store = db.write().await;
    if !store.campaigns.contains_key(&campaign_id) {
        return Err(ApiProblem::not_found());
    }
    let content = json!({
        "html": input.get("html").cloned().unwrap_or(Value::Null),
        "plain_text": input.get("plain_text").cloned().unwrap_or_else(|| json!("")),
    });
    store.content.insert(campaign_id, content.clone());
    Ok(Json(content))
}

async fn get_campaign_content(
    State(db): State<Db>,
    Path(campaign_id): Path<String>,
) -> Result<Json<Value>, ApiProblem> {
    let store = db.read().await;
    if !store.campaigns.contains_key(&campaign_id) {
        return Err(ApiProblem::not_found());
    }
    let content = store
        .content
        .get(&campaign_id)
        .cloned()
        .unwrap_or_else(|| json!({ "html": null, "plain_text": "" }));
    Ok(Json(content))
}

fn email_address(input: &Value) -> Result<String, ApiProblem> {
    input
        .get("email_address")
        .and_then(Value::as_str)
        .filter(|e| e.contains('@'))
        .map(str::to_string)
        .ok_or_else(|| ApiProblem::invalid("Please provide a valid email address."))
}

fn member_status(value: Option<&Value>) -> Result<Option<String>, ApiProblem> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_str()
            .filter(|s| MEMBER_STATUSES.contains(s))
            .map(|s| Some(s.to_string()))
            .ok_or_else(|| ApiProblem::invalid(format!("`{v}` is not a valid member status."))),
    }
}

fn merge_fields(input: &Value) -> Map<String, Value> {
    input
        .get("merge_fields")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default()
}

fn apply_changes(member: &mut Member, input: &Value, status: Option<String>) {
    if let Some(status) = status {
        member.status = status;
    }
    if let Some(email_type) = input.get("email_type").and_then(Value::as_str) {
        member.email_type = email_type.to_string();
    }
    if let Some(fields) = input.get("merge_fields").and_then(Value::as_object) {
        member.merge_fields.extend(fields.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscriber_hash_ignores_case() {
        assert_eq!(
            subscriber_hash("Jane@Example.com"),
            "9e26471d35a78862c17e467d87cddedf"
        );
    }

    #[test]
    fn member_serializes_to_json() {
        let member = Member {
            id: "abc".to_string(),
            email_address: "jane@example.com".to_string(),
            status: "subscribed".to_string(),
            email_type: "html".to_string(),
            merge_fields: Map::new(),
            list_id: "list1".to_string(),
            tags: vec![Tag {
                name: "vip".to_string(),
            }],
        };
        let json = serde_json::to_value(&member).unwrap();
        assert_eq!(json["email_address"], "jane@example.com");
        assert_eq!(json["tags"][0]["name"], "vip");
    }

    #[test]
    fn campaign_type_is_renamed() {
        let campaign = Campaign {
            id: "c1".to_string(),
            kind: "regular".to_string(),
            status: "save".to_string(),
            recipients: json!({"list_id": "list1"}),
            settings: json!({}),
        };
        let json = serde_json::to_value(&campaign).unwrap();
        assert_eq!(json["type"], "regular");
        assert!(json.get("kind").is_none());
    }

    #[test]
    fn member_status_validation() {
        assert_eq!(member_status(None).unwrap(), None);
        assert_eq!(
            member_status(Some(&json!("pending"))).unwrap().as_deref(),
            Some("pending")
        );
        assert!(member_status(Some(&json!("nope"))).is_err());
        assert!(member_status(Some(&json!(3))).is_err());
    }

    #[test]
    fn apply_changes_merges_fields() {
        let mut member = Member {
            id: "abc".to_string(),
            email_address: "jane@example.com".to_string(),
            status: "subscribed".to_string(),
            email_type: "html".to_string(),
            merge_fields: json!({"FNAME": "Jane", "LNAME": "Doe"})
                .as_object()
                .cloned()
                .unwrap(),
            list_id: "list1".to_string(),
            tags: Vec::new(),
        };
        apply_changes(
            &mut member,
            &json!({"merge_fields": {"FNAME": "Janet"}, "email_type": "text"}),
            Some("unsubscribed".to_string()),
        );
        assert_eq!(member.status, "unsubscribed");
        assert_eq!(member.email_type, "text");
        assert_eq!(member.merge_fields["FNAME"], "Janet");
        assert_eq!(member.merge_fields["LNAME"], "Doe");
    }
}
