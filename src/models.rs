/// Partial user data model as included in webhook payloads and GitHub API responses.
#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct User
{
	/// The user’s handle.
	pub login: String,
	// We don’t need the other fields, so ignore them
}

/// Partial repository data model as delivered in repository webhook events.
#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Repository
{
	/// The name of the repository.
	pub name: String,
	/// Handle of the user or organization owning the repository.
	pub owner: User,
	/// The full `owner/name` slug of the repository.
	pub full_name: String,
	/// The default branch name as reported in the webhook payload. Deliveries may carry a stale
	/// or incorrect value here, so this is never used for API calls; the authoritative name is
	/// fetched from the repository metadata instead.
	pub default_branch: String,
	/// Whether the repository is private.
	#[serde(rename = "private")]
	pub is_private: bool,
	/// When the repository was created.
	pub created_at: chrono::DateTime<chrono::Utc>,
	// We don’t need the other fields, so ignore them
}

/// Action field of a repository webhook event.
#[derive(Debug, Eq, PartialEq, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepositoryAction
{
	Created,
	/// Catch-all for the remaining repository actions (deleted, archived, and so on), none of
	/// which this service reacts to.
	#[serde(other)]
	Other,
}

/// Webhook event payload for repository events as provided by the GitHub server.
#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RepositoryEventPayload
{
	/// What happened to the repository.
	pub action: RepositoryAction,
	/// The repository for which this event is reported.
	pub repository: Repository,
	// We don’t need the other fields, so ignore them
}

/// Entry of the branch list returned by the GitHub API.
#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Branch
{
	/// The name of the branch.
	pub name: String,
	// We don’t need the other fields, so ignore them
}

/// Partial repository metadata as returned by the GitHub API, holding the authoritative default
/// branch name.
#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RepositoryMetadataResponse
{
	/// The name of the repository’s default branch (usually `main`).
	pub default_branch: String,
	// We don’t need the other fields, so ignore them
}

/// Partial single-branch detail as returned by the GitHub API.
#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BranchDetailResponse
{
	/// Whether a branch protection rule is currently in place for this branch.
	pub protected: bool,
	// We don’t need the other fields, so ignore them
}

/// The branch protection rule set this service applies to new default branches.
///
/// Exactly one policy is active per deployment, selected in the config file.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtectionPolicy
{
	/// Disallow direct pushes to the default branch for all teams and users.
	RestrictPushes,
	/// Require one approving pull request review before merging, dismiss stale approvals when new
	/// commits are pushed, and enforce the rules for administrators as well.
	#[default]
	RequireReview,
}

/// Partial data model for the parameters needed to make a GitHub API request to protect a branch.
#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub struct ProtectBranchRequest
{
	/// Required status checks are not part of either policy, so this stays at `None`.
	pub required_status_checks: Option<UnsupportedField>,
	/// Whether the configured restrictions also apply to repository administrators.
	pub enforce_admins: bool,
	/// Pull request review requirements, or `None` to require no reviews.
	pub required_pull_request_reviews: Option<RequiredPullRequestReviews>,
	/// Which teams and users may push to the branch, or `None` to not restrict pushes.
	pub restrictions: Option<PushRestrictions>,
	// We don’t need to set the other optional fields, so ignore them
}

impl ProtectBranchRequest
{
	/// Build the protection request body for the given policy.
	pub fn for_policy(policy: ProtectionPolicy) -> Self
	{
		match policy
		{
			ProtectionPolicy::RestrictPushes => Self
			{
				required_status_checks: None,
				enforce_admins: false,
				required_pull_request_reviews: None,
				// Empty team and user lists mean that nobody may push to the branch directly
				restrictions: Some(PushRestrictions
				{
					teams: vec![],
					users: vec![],
				}),
			},
			ProtectionPolicy::RequireReview => Self
			{
				required_status_checks: None,
				enforce_admins: true,
				required_pull_request_reviews: Some(RequiredPullRequestReviews
				{
					required_approving_review_count: 1,
					dismiss_stale_reviews: true,
				}),
				restrictions: None,
			},
		}
	}
}

/// Pull request review requirements of a branch protection rule.
#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub struct RequiredPullRequestReviews
{
	/// How many approving reviews a pull request needs before it can be merged.
	pub required_approving_review_count: u8,
	/// Whether new reviewable commits dismiss existing approvals.
	pub dismiss_stale_reviews: bool,
	// We don’t need to set the other optional fields, so ignore them
}

/// The teams and users allowed to push to a protected branch.
#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub struct PushRestrictions
{
	pub teams: Vec<String>,
	pub users: Vec<String>,
}

/// Partial data model for the parameters needed to make a GitHub API request to create a new issue.
#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub struct CreateIssueRequest<'a>
{
	/// The title of the issue.
	pub title: &'a str,
	/// The contents of the issue.
	pub body: Option<&'a str>,
	// We don’t need to set the optional fields, so ignore them
}

/// Partial data model for the response of the GitHub API to a request to create a new issue.
#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CreateIssueResponse
{
	/// User-facing URL of the created issue.
	pub html_url: url::Url,
	// We don’t need the other fields, so ignore them
}

/// A field that is not part of any supported protection policy and needs to be serialized as
/// `null`.
#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub struct UnsupportedField;

/// Data model representing a response we’re going to ignore.
#[derive(Debug, serde::Deserialize)]
pub struct IgnoreResponse
{
}

#[cfg(test)]
mod tests
{
	use super::*;

	#[test]
	fn repository_creation_payload_decodes()
	{
		let payload = serde_json::json!(
		{
			"action": "created",
			"repository":
			{
				"name": "hello-world",
				"owner": {"login": "octocat"},
				"full_name": "octocat/hello-world",
				"default_branch": "main",
				"private": true,
				"created_at": "2024-05-01T12:00:00Z",
			},
		});

		let payload: RepositoryEventPayload = serde_json::from_value(payload).unwrap();

		assert_eq!(payload.action, RepositoryAction::Created);
		assert_eq!(payload.repository.name, "hello-world");
		assert_eq!(payload.repository.owner.login, "octocat");
		assert_eq!(payload.repository.full_name, "octocat/hello-world");
		assert_eq!(payload.repository.default_branch, "main");
		assert!(payload.repository.is_private);
		assert_eq!(payload.repository.created_at,
			chrono::DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z").unwrap());
	}

	#[test]
	fn unknown_actions_decode_to_the_catch_all_variant()
	{
		for action in ["deleted", "archived", "publicized", "renamed"]
		{
			let payload = serde_json::json!(
			{
				"action": action,
				"repository":
				{
					"name": "hello-world",
					"owner": {"login": "octocat"},
					"full_name": "octocat/hello-world",
					"default_branch": "main",
					"private": false,
					"created_at": "2024-05-01T12:00:00Z",
				},
			});

			let payload: RepositoryEventPayload = serde_json::from_value(payload).unwrap();

			assert_eq!(payload.action, RepositoryAction::Other);
		}
	}

	#[test]
	fn payload_without_owner_login_is_rejected()
	{
		let payload = serde_json::json!(
		{
			"action": "created",
			"repository":
			{
				"name": "hello-world",
				"full_name": "octocat/hello-world",
				"default_branch": "main",
				"private": false,
				"created_at": "2024-05-01T12:00:00Z",
			},
		});

		assert!(serde_json::from_value::<RepositoryEventPayload>(payload).is_err());
	}

	#[test]
	fn restrict_pushes_policy_locks_down_all_pushes()
	{
		let request = ProtectBranchRequest::for_policy(ProtectionPolicy::RestrictPushes);

		assert_eq!(serde_json::to_value(&request).unwrap(),
			serde_json::json!(
			{
				"required_status_checks": null,
				"enforce_admins": false,
				"required_pull_request_reviews": null,
				"restrictions": {"teams": [], "users": []},
			}));
	}

	#[test]
	fn require_review_policy_demands_one_approving_review()
	{
		let request = ProtectBranchRequest::for_policy(ProtectionPolicy::RequireReview);

		assert_eq!(serde_json::to_value(&request).unwrap(),
			serde_json::json!(
			{
				"required_status_checks": null,
				"enforce_admins": true,
				"required_pull_request_reviews":
				{
					"required_approving_review_count": 1,
					"dismiss_stale_reviews": true,
				},
				"restrictions": null,
			}));
	}
}
