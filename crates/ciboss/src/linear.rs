//! Linear GraphQL client.
//!
//! Creates failure issues, appends comments, and moves issues between
//! workflow states. GraphQL `errors` in a 200 response count as failure.

use async_trait::async_trait;
use ciboss_core::Config;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Priority assigned to created issues (Linear "Medium").
pub const ISSUE_PRIORITY: u8 = 2;

const ERROR_BODY_PREVIEW: usize = 200;

const CREATE_ISSUE_MUTATION: &str = r#"
mutation CreateIssue($input: IssueCreateInput!) {
  issueCreate(input: $input) {
    success
    issue {
      id
      identifier
      url
    }
  }
}
"#;

const CREATE_COMMENT_MUTATION: &str = r#"
mutation CreateComment($input: CommentCreateInput!) {
  commentCreate(input: $input) {
    success
  }
}
"#;

const TEAM_STATES_QUERY: &str = r#"
query GetWorkflowStates($teamId: String!) {
  team(id: $teamId) {
    states {
      nodes {
        id
        name
      }
    }
  }
}
"#;

const UPDATE_ISSUE_MUTATION: &str = r#"
mutation UpdateIssue($id: String!, $input: IssueUpdateInput!) {
  issueUpdate(id: $id, input: $input) {
    success
  }
}
"#;

#[derive(Debug, Error)]
pub enum LinearError {
    #[error("Linear API key not configured")]
    NotConfigured,
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("GraphQL errors: {0}")]
    Graphql(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("{0} reported success=false")]
    Unsuccessful(&'static str),
}

pub type Result<T> = std::result::Result<T, LinearError>;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CreatedIssue {
    pub id: String,
    pub identifier: String,
    pub url: String,
}

/// Issue tracker as seen by the orchestration loop.
#[async_trait]
pub trait IssueTracker: Send + Sync {
    /// Whether both credentials and a team are available.
    fn is_configured(&self) -> bool;

    fn team_id(&self) -> Option<&str>;

    async fn create_issue(
        &self,
        title: &str,
        description: &str,
        label_ids: &[String],
    ) -> Option<CreatedIssue>;

    async fn add_comment(&self, issue_id: &str, body: &str) -> bool;

    /// Id of the team's workflow state named `name` (case-insensitive).
    async fn find_workflow_state(&self, team_id: &str, name: &str) -> Option<String>;

    async fn update_issue_state(&self, issue_id: &str, state_id: &str) -> bool;
}

#[derive(Debug, Deserialize)]
struct GraphqlEnvelope {
    data: Option<Value>,
    errors: Option<Vec<GraphqlError>>,
}

#[derive(Debug, Deserialize)]
struct GraphqlError {
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IssueCreateData {
    issue_create: IssueCreatePayload,
}

#[derive(Debug, Deserialize)]
struct IssueCreatePayload {
    success: bool,
    issue: Option<CreatedIssue>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommentCreateData {
    comment_create: SuccessPayload,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IssueUpdateData {
    issue_update: SuccessPayload,
}

#[derive(Debug, Deserialize)]
struct SuccessPayload {
    success: bool,
}

#[derive(Debug, Deserialize)]
struct TeamStatesData {
    team: Option<TeamStates>,
}

#[derive(Debug, Deserialize)]
struct TeamStates {
    states: StateConnection,
}

#[derive(Debug, Deserialize)]
struct StateConnection {
    nodes: Vec<WorkflowStateNode>,
}

#[derive(Debug, Deserialize)]
struct WorkflowStateNode {
    id: String,
    name: String,
}

/// Linear GraphQL API client.
#[derive(Debug, Clone)]
pub struct LinearClient {
    api_url: String,
    api_key: Option<String>,
    team_id: Option<String>,
    http: reqwest::Client,
}

impl LinearClient {
    pub fn new(
        api_url: &str,
        api_key: Option<String>,
        team_id: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            api_url: api_url.to_string(),
            api_key: api_key.filter(|k| !k.is_empty()),
            team_id: team_id.filter(|t| !t.is_empty()),
            http,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            &config.linear_api_url,
            config.linear_api_key.clone(),
            config.linear_team_id.clone(),
            Duration::from_secs(config.http_timeout_sec),
        )
    }

    async fn execute<T: DeserializeOwned>(&self, query: &str, variables: Value) -> Result<T> {
        let api_key = self.api_key.as_deref().ok_or(LinearError::NotConfigured)?;
        debug!(url = %self.api_url, "POST graphql");

        // Linear takes the personal API key as-is, without a scheme.
        let response = self
            .http
            .post(&self.api_url)
            .header(reqwest::header::AUTHORIZATION, api_key)
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(LinearError::Status {
                status: status.as_u16(),
                body: body.chars().take(ERROR_BODY_PREVIEW).collect(),
            });
        }

        let envelope: GraphqlEnvelope = serde_json::from_str(&body)
            .map_err(|e| LinearError::InvalidResponse(e.to_string()))?;
        if let Some(errors) = envelope.errors {
            let message = errors
                .into_iter()
                .map(|e| e.message)
                .collect::<Vec<_>>()
                .join("; ");
            return Err(LinearError::Graphql(message));
        }

        let data = envelope
            .data
            .ok_or_else(|| LinearError::InvalidResponse("missing data payload".to_string()))?;
        serde_json::from_value(data).map_err(|e| LinearError::InvalidResponse(e.to_string()))
    }

    async fn try_create_issue(
        &self,
        title: &str,
        description: &str,
        label_ids: &[String],
    ) -> Result<CreatedIssue> {
        let team_id = self.team_id.as_deref().ok_or(LinearError::NotConfigured)?;
        let mut input = json!({
            "teamId": team_id,
            "title": title,
            "description": description,
            "priority": ISSUE_PRIORITY,
        });
        if !label_ids.is_empty() {
            input["labelIds"] = json!(label_ids);
        }

        let data: IssueCreateData = self
            .execute(CREATE_ISSUE_MUTATION, json!({ "input": input }))
            .await?;
        match data.issue_create {
            IssueCreatePayload {
                success: true,
                issue: Some(issue),
            } => Ok(issue),
            _ => Err(LinearError::Unsuccessful("issueCreate")),
        }
    }

    async fn try_add_comment(&self, issue_id: &str, body: &str) -> Result<()> {
        let data: CommentCreateData = self
            .execute(
                CREATE_COMMENT_MUTATION,
                json!({ "input": { "issueId": issue_id, "body": body } }),
            )
            .await?;
        if data.comment_create.success {
            Ok(())
        } else {
            Err(LinearError::Unsuccessful("commentCreate"))
        }
    }

    async fn try_find_workflow_state(&self, team_id: &str, name: &str) -> Result<Option<String>> {
        let data: TeamStatesData = self
            .execute(TEAM_STATES_QUERY, json!({ "teamId": team_id }))
            .await?;
        let team = data
            .team
            .ok_or_else(|| LinearError::InvalidResponse(format!("team {team_id} not found")))?;
        Ok(team
            .states
            .nodes
            .into_iter()
            .find(|state| state.name.eq_ignore_ascii_case(name))
            .map(|state| state.id))
    }

    async fn try_update_issue_state(&self, issue_id: &str, state_id: &str) -> Result<()> {
        let data: IssueUpdateData = self
            .execute(
                UPDATE_ISSUE_MUTATION,
                json!({ "id": issue_id, "input": { "stateId": state_id } }),
            )
            .await?;
        if data.issue_update.success {
            Ok(())
        } else {
            Err(LinearError::Unsuccessful("issueUpdate"))
        }
    }
}

#[async_trait]
impl IssueTracker for LinearClient {
    fn is_configured(&self) -> bool {
        self.api_key.is_some() && self.team_id.is_some()
    }

    fn team_id(&self) -> Option<&str> {
        self.team_id.as_deref()
    }

    async fn create_issue(
        &self,
        title: &str,
        description: &str,
        label_ids: &[String],
    ) -> Option<CreatedIssue> {
        match self.try_create_issue(title, description, label_ids).await {
            Ok(issue) => {
                info!(identifier = %issue.identifier, url = %issue.url, "created Linear issue");
                Some(issue)
            }
            Err(e) => {
                error!(error = %e, "failed to create Linear issue");
                None
            }
        }
    }

    async fn add_comment(&self, issue_id: &str, body: &str) -> bool {
        match self.try_add_comment(issue_id, body).await {
            Ok(()) => {
                info!(issue_id = %issue_id, "added comment to Linear issue");
                true
            }
            Err(e) => {
                error!(issue_id = %issue_id, error = %e, "failed to comment on Linear issue");
                false
            }
        }
    }

    async fn find_workflow_state(&self, team_id: &str, name: &str) -> Option<String> {
        match self.try_find_workflow_state(team_id, name).await {
            Ok(Some(id)) => Some(id),
            Ok(None) => {
                warn!(team_id = %team_id, state = %name, "workflow state not found");
                None
            }
            Err(e) => {
                error!(team_id = %team_id, error = %e, "failed to fetch workflow states");
                None
            }
        }
    }

    async fn update_issue_state(&self, issue_id: &str, state_id: &str) -> bool {
        match self.try_update_issue_state(issue_id, state_id).await {
            Ok(()) => {
                info!(issue_id = %issue_id, state_id = %state_id, "updated Linear issue state");
                true
            }
            Err(e) => {
                error!(issue_id = %issue_id, error = %e, "failed to update Linear issue state");
                false
            }
        }
    }
}
