use std::collections::HashMap;

use chrono::{DateTime, Utc};
use reqwest::{header, Client, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{Result, SurveyError};
use crate::models::{Account, Assignment, Course, Enrollment, Quiz, Submission};

/// Where the items of a page live in the response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageShape {
    /// The body is the JSON array itself.
    Bare,
    /// The body is an object holding the array under this field.
    Field(&'static str),
}

/// Items gathered from a paginated collection.
///
/// When a page fails, `items` keeps every page read before the failure and
/// `error` says why the walk stopped.
#[derive(Debug)]
pub struct Paged<T> {
    pub items: Vec<T>,
    pub error: Option<SurveyError>,
}

impl<T> Paged<T> {
    pub fn into_result(self) -> Result<Vec<T>> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.items),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    endpoint: String,
    params: Vec<(String, String)>,
}

impl CacheKey {
    fn new(endpoint: &str, params: &[(&str, String)]) -> Self {
        let mut params: Vec<(String, String)> = params
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        params.sort();
        Self {
            endpoint: endpoint.to_string(),
            params,
        }
    }
}

/// Response bodies keyed by endpoint and query parameters.
#[derive(Debug, Default)]
pub struct ResponseCache {
    entries: HashMap<CacheKey, Value>,
}

impl ResponseCache {
    pub fn get(&self, endpoint: &str, params: &[(&str, String)]) -> Option<&Value> {
        self.entries.get(&CacheKey::new(endpoint, params))
    }

    pub fn insert(&mut self, endpoint: &str, params: &[(&str, String)], body: Value) {
        self.entries.insert(CacheKey::new(endpoint, params), body);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

pub struct CanvasClient {
    http: Client,
    base_url: String,
    token: String,
    per_page: u32,
    cache: ResponseCache,
}

impl CanvasClient {
    pub fn new(config: &Config) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("canvas-survey-rates/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            per_page: config.per_page,
            cache: ResponseCache::default(),
        })
    }

    pub fn api_url(&self, path: &str) -> String {
        format!("{}/api/v1/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub fn course_link(&self, course_id: &str) -> String {
        format!("{}/courses/{}", self.base_url, course_id)
    }

    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    #[cfg(test)]
    pub(crate) fn cache_mut(&mut self) -> &mut ResponseCache {
        &mut self.cache
    }

    pub(crate) async fn get(&self, url: &str, query: &[(&str, String)]) -> Result<Response> {
        let mut request = self.http.get(url).bearer_auth(&self.token);
        if !query.is_empty() {
            request = request.query(query);
        }
        Ok(request.send().await?)
    }

    pub(crate) async fn post_json<B: Serialize + ?Sized>(&self, url: &str, body: &B) -> Result<Response> {
        Ok(self
            .http
            .post(url)
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await?)
    }

    /// Walks a paginated collection by following `Link: rel="next"` headers.
    ///
    /// `params` and the page-size hint go on the first request only; the next
    /// links already carry them.
    pub async fn fetch_all<T: DeserializeOwned>(
        &self,
        resource: &str,
        url: &str,
        params: &[(&str, String)],
        shape: PageShape,
    ) -> Paged<T> {
        let mut query: Vec<(&str, String)> = params.to_vec();
        query.push(("per_page", self.per_page.to_string()));

        let mut items = Vec::new();
        let mut next = Some(url.to_string());
        let mut page = 0usize;

        while let Some(page_url) = next.take() {
            let page_query: &[(&str, String)] = if page == 0 { &query } else { &[] };
            page += 1;

            let response = match self.get(&page_url, page_query).await {
                Ok(response) => response,
                Err(err) => return Paged { items, error: Some(err) },
            };

            let status = response.status();
            if !status.is_success() {
                warn!(resource, page, status = status.as_u16(), "page request failed");
                return Paged {
                    items,
                    error: Some(SurveyError::Fetch {
                        resource: resource.to_string(),
                        status: status.as_u16(),
                    }),
                };
            }

            next = response
                .headers()
                .get(header::LINK)
                .and_then(|value| value.to_str().ok())
                .and_then(parse_next_link);

            let body: Value = match response.json().await {
                Ok(body) => body,
                Err(err) => return Paged { items, error: Some(err.into()) },
            };

            match page_items::<T>(resource, body, shape) {
                Ok(mut page_items) => {
                    debug!(resource, page, count = page_items.len(), "fetched page");
                    items.append(&mut page_items);
                }
                Err(err) => return Paged { items, error: Some(err) },
            }
        }

        Paged { items, error: None }
    }

    pub async fn course(&mut self, course_id: &str) -> Result<Course> {
        let url = self.api_url(&format!("courses/{course_id}"));
        self.get_cached("course", &url).await
    }

    pub async fn account(&mut self, account_id: u64) -> Result<Account> {
        let url = self.api_url(&format!("accounts/{account_id}"));
        self.get_cached("account", &url).await
    }

    /// Quizzes of type `survey` or `graded_survey`, across all pages.
    pub async fn survey_quizzes(&mut self, course_id: &str) -> Result<Vec<Quiz>> {
        let url = self.api_url(&format!("courses/{course_id}/quizzes"));
        let body = match self.cache.get(&url, &[]).cloned() {
            Some(body) => body,
            None => {
                let items = self
                    .fetch_all::<Value>("quizzes", &url, &[], PageShape::Bare)
                    .await
                    .into_result()?;
                let body = Value::Array(items);
                self.cache.insert(&url, &[], body.clone());
                body
            }
        };

        let quizzes: Vec<Quiz> =
            serde_json::from_value(body).map_err(|err| SurveyError::schema("quizzes", err))?;
        Ok(quizzes.into_iter().filter(Quiz::is_survey).collect())
    }

    /// Latest assignment due date in the course. A failed page keeps the
    /// dates read so far.
    pub async fn last_assignment_due_at(&mut self, course_id: &str) -> Result<Option<DateTime<Utc>>> {
        let url = self.api_url(&format!("courses/{course_id}/assignments"));
        let body = match self.cache.get(&url, &[]).cloned() {
            Some(body) => body,
            None => {
                let paged = self
                    .fetch_all::<Value>("assignments", &url, &[], PageShape::Bare)
                    .await;
                if let Some(err) = &paged.error {
                    warn!(course_id, error = %err, "assignment listing incomplete");
                }
                let body = Value::Array(paged.items);
                self.cache.insert(&url, &[], body.clone());
                body
            }
        };

        let assignments: Vec<Assignment> =
            serde_json::from_value(body).map_err(|err| SurveyError::schema("assignments", err))?;
        Ok(assignments.iter().filter_map(|a| a.due_at).max())
    }

    /// Active student enrollments as returned by Canvas. The caller drops the
    /// test account.
    pub async fn student_enrollments(&self, course_id: &str) -> Paged<Enrollment> {
        let url = self.api_url(&format!("courses/{course_id}/enrollments"));
        let params = [
            ("type[]", "StudentEnrollment".to_string()),
            ("state[]", "active".to_string()),
        ];
        self.fetch_all("enrollments", &url, &params, PageShape::Bare)
            .await
    }

    pub async fn quiz_submissions(&self, course_id: &str, quiz_id: u64) -> Paged<Submission> {
        let url = self.api_url(&format!("courses/{course_id}/quizzes/{quiz_id}/submissions"));
        let params = [("include[]", "submission".to_string())];
        self.fetch_all(
            "quiz submissions",
            &url,
            &params,
            PageShape::Field("quiz_submissions"),
        )
        .await
    }

    async fn get_cached<T: DeserializeOwned>(&mut self, resource: &str, url: &str) -> Result<T> {
        if let Some(body) = self.cache.get(url, &[]).cloned() {
            return serde_json::from_value(body).map_err(|err| SurveyError::schema(resource, err));
        }

        let response = self.get(url, &[]).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SurveyError::Fetch {
                resource: resource.to_string(),
                status: status.as_u16(),
            });
        }

        let body: Value = response.json().await?;
        let parsed = serde_json::from_value(body.clone())
            .map_err(|err| SurveyError::schema(resource, err))?;
        self.cache.insert(url, &[], body);
        Ok(parsed)
    }
}

fn page_items<T: DeserializeOwned>(resource: &str, body: Value, shape: PageShape) -> Result<Vec<T>> {
    let collection = match (shape, body) {
        (PageShape::Bare, body) => body,
        (PageShape::Field(field), Value::Object(mut map)) => map.remove(field).unwrap_or(Value::Null),
        (PageShape::Field(_), _) => Value::Null,
    };
    serde_json::from_value(collection).map_err(|err| SurveyError::schema(resource, err))
}

/// Extracts the `rel="next"` target from an RFC 8288 `Link` header.
pub fn parse_next_link(header: &str) -> Option<String> {
    header.split(',').find_map(|entry| {
        let mut parts = entry.split(';');
        let target = parts.next()?.trim();
        let url = target.strip_prefix('<')?.strip_suffix('>')?;
        let is_next = parts.any(|param| {
            let param = param.trim().replace(' ', "");
            param == "rel=\"next\"" || param == "rel=next"
        });
        is_next.then(|| url.to_string())
    })
}
