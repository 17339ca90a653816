//! Jira REST client: posts work-log entries and lists the user's open issues.

use crate::error::{Error, Result};
use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_JIRA_URL: &str = "https://metacloud.jira.com";
pub const DEFAULT_TIMEOUT_SECS: u64 = 20;
const SEARCH_MAX_RESULTS: &str = "100";

/// Username and password sent with every request.
///
/// Marked invalid when the server answers 401; an invalid value must be replaced before
/// the next remote call.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    username: String,
    password: String,
    valid: bool,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Credentials {
            username: username.into(),
            password: password.into(),
            valid: true,
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn invalidate(&mut self) {
        self.valid = false;
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("valid", &self.valid)
            .finish()
    }
}

/// Result of posting one work-log entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PostOutcome {
    Created,
    Unauthorized,
    /// Any other HTTP status.
    Rejected(u16),
    /// No usable HTTP response (connection, timeout, unreadable body).
    Transport(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IssueSummary {
    pub key: String,
    pub summary: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SearchOutcome {
    Found(Vec<IssueSummary>),
    Unauthorized,
    Rejected(u16),
    Transport(String),
}

/// The remote work-log service.
pub trait WorkLogClient {
    fn post_work_log(
        &self,
        issue: &str,
        comment: &str,
        seconds: u64,
        credentials: &Credentials,
    ) -> PostOutcome;

    /// Unresolved issues assigned to the credentials' user.
    fn search_assigned_open_issues(&self, credentials: &Credentials) -> SearchOutcome;
}

#[derive(Serialize)]
struct WorkLogRequest<'a> {
    comment: &'a str,
    #[serde(rename = "timeSpentSeconds")]
    time_spent_seconds: u64,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    issues: Vec<SearchIssue>,
}

#[derive(Deserialize)]
struct SearchIssue {
    key: String,
    #[serde(default)]
    fields: SearchFields,
}

#[derive(Deserialize, Default)]
struct SearchFields {
    #[serde(default)]
    summary: Option<String>,
}

/// Blocking Jira client for the v2 REST API.
pub struct JiraClient {
    base_url: String,
    client: Client,
}

impl JiraClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base_url = base_url.trim();
        if base_url.is_empty() {
            return Err(Error::Config("Jira URL cannot be empty".to_string()));
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(JiraClient {
            base_url: base_url.to_string(),
            client,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        let suffix = path.trim_start_matches('/');
        format!("{}/{}", base, suffix)
    }
}

impl WorkLogClient for JiraClient {
    fn post_work_log(
        &self,
        issue: &str,
        comment: &str,
        seconds: u64,
        credentials: &Credentials,
    ) -> PostOutcome {
        let url = self.endpoint(&format!("rest/api/2/issue/{}/worklog", issue));
        debug!("POST {} ({} seconds)", url, seconds);
        let body = WorkLogRequest {
            comment,
            time_spent_seconds: seconds,
        };
        let resp = self
            .client
            .post(url)
            .basic_auth(credentials.username(), Some(credentials.password()))
            .json(&body)
            .send();
        match resp {
            Ok(resp) => match resp.status() {
                s if s.is_success() => PostOutcome::Created,
                StatusCode::UNAUTHORIZED => PostOutcome::Unauthorized,
                s => PostOutcome::Rejected(s.as_u16()),
            },
            Err(e) => PostOutcome::Transport(e.to_string()),
        }
    }

    fn search_assigned_open_issues(&self, credentials: &Credentials) -> SearchOutcome {
        let url = self.endpoint("rest/api/2/search");
        let jql = format!(
            "assignee=\"{}\" AND resolution IS EMPTY",
            credentials.username()
        );
        debug!("GET {} jql={}", url, jql);
        let resp = self
            .client
            .get(url)
            .basic_auth(credentials.username(), Some(credentials.password()))
            .query(&[
                ("jql", jql.as_str()),
                ("fields", "id,summary"),
                ("maxResults", SEARCH_MAX_RESULTS),
            ])
            .send();
        let resp = match resp {
            Ok(resp) => resp,
            Err(e) => return SearchOutcome::Transport(e.to_string()),
        };
        match resp.status() {
            StatusCode::OK => {}
            StatusCode::UNAUTHORIZED => return SearchOutcome::Unauthorized,
            s => return SearchOutcome::Rejected(s.as_u16()),
        }
        match resp.json::<SearchResponse>() {
            Ok(body) => SearchOutcome::Found(
                body.issues
                    .into_iter()
                    .map(|issue| IssueSummary {
                        key: issue.key,
                        summary: issue.fields.summary.unwrap_or_default(),
                    })
                    .collect(),
            ),
            Err(e) => SearchOutcome::Transport(format!("malformed search response: {}", e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread::{self, JoinHandle};

    /// Serves exactly one HTTP response and hands back the raw request it received.
    fn one_shot_server(status: &str, body: &str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let response = format!(
            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        );
        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut raw = Vec::new();
            let mut buf = [0u8; 4096];
            let header_end = loop {
                let n = stream.read(&mut buf).unwrap();
                assert!(n > 0, "client closed before sending headers");
                raw.extend_from_slice(&buf[..n]);
                if let Some(pos) = raw.windows(4).position(|w| w == b"\r\n\r\n") {
                    break pos + 4;
                }
            };
            let head = String::from_utf8_lossy(&raw[..header_end]).to_lowercase();
            let content_length = head
                .lines()
                .find_map(|l| l.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            while raw.len() < header_end + content_length {
                let n = stream.read(&mut buf).unwrap();
                if n == 0 {
                    break;
                }
                raw.extend_from_slice(&buf[..n]);
            }
            stream.write_all(response.as_bytes()).unwrap();
            stream.flush().unwrap();
            String::from_utf8_lossy(&raw).into_owned()
        });
        (url, handle)
    }

    fn creds() -> Credentials {
        Credentials::new("mike", "hunter2")
    }

    #[test]
    fn test_post_work_log_created() {
        let (url, server) = one_shot_server("201 Created", "{}");
        let client = JiraClient::new(&url, Duration::from_secs(5)).unwrap();
        let out = client.post_work_log("OPS-7", "Daily emails", 120, &creds());
        assert_eq!(out, PostOutcome::Created);
        let request = server.join().unwrap();
        assert!(request.starts_with("POST /rest/api/2/issue/OPS-7/worklog "));
        assert!(request.to_lowercase().contains("authorization: basic "));
        assert!(request.contains("\"timeSpentSeconds\":120"));
        assert!(request.contains("\"comment\":\"Daily emails\""));
    }

    #[test]
    fn test_post_work_log_unauthorized() {
        let (url, server) = one_shot_server("401 Unauthorized", "");
        let client = JiraClient::new(&url, Duration::from_secs(5)).unwrap();
        assert_eq!(
            client.post_work_log("OPS-7", "", 60, &creds()),
            PostOutcome::Unauthorized
        );
        server.join().unwrap();
    }

    #[test]
    fn test_post_work_log_rejected() {
        let (url, server) = one_shot_server("400 Bad Request", "{\"errorMessages\":[]}");
        let client = JiraClient::new(&url, Duration::from_secs(5)).unwrap();
        assert_eq!(
            client.post_work_log("OPS-7", "", 60, &creds()),
            PostOutcome::Rejected(400)
        );
        server.join().unwrap();
    }

    #[test]
    fn test_post_work_log_unreachable() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);
        let client = JiraClient::new(&url, Duration::from_secs(5)).unwrap();
        assert!(matches!(
            client.post_work_log("OPS-7", "", 60, &creds()),
            PostOutcome::Transport(_)
        ));
    }

    #[test]
    fn test_search_assigned_open_issues() {
        let body = r#"{"startAt":0,"issues":[
            {"id":"1","key":"OPS-1","fields":{"summary":"Rotate certs"}},
            {"id":"2","key":"OPS-2","fields":{}}
        ]}"#;
        let (url, server) = one_shot_server("200 OK", body);
        let client = JiraClient::new(&format!("{}/", url), Duration::from_secs(5)).unwrap();
        let out = client.search_assigned_open_issues(&creds());
        assert_eq!(
            out,
            SearchOutcome::Found(vec![
                IssueSummary {
                    key: "OPS-1".into(),
                    summary: "Rotate certs".into()
                },
                IssueSummary {
                    key: "OPS-2".into(),
                    summary: String::new()
                },
            ])
        );
        let request = server.join().unwrap();
        assert!(request.starts_with("GET /rest/api/2/search?jql="));
        assert!(request.contains("maxResults=100"));
    }

    #[test]
    fn test_search_unauthorized() {
        let (url, server) = one_shot_server("401 Unauthorized", "");
        let client = JiraClient::new(&url, Duration::from_secs(5)).unwrap();
        assert_eq!(
            client.search_assigned_open_issues(&creds()),
            SearchOutcome::Unauthorized
        );
        server.join().unwrap();
    }

    #[test]
    fn test_empty_url_is_config_error() {
        assert!(matches!(
            JiraClient::new("  ", Duration::from_secs(1)),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_credentials_debug_hides_password() {
        let mut c = creds();
        assert!(!format!("{:?}", c).contains("hunter2"));
        assert!(c.is_valid());
        c.invalidate();
        assert!(!c.is_valid());
    }
}
