#[doc(hidden)]
mod config;
#[doc(hidden)]
mod error;
pub mod github_api;
#[doc(hidden)]
mod models;

pub use config::Config;
pub use error::Error;
pub use models::*;

#[tokio::main]
async fn main() -> anyhow::Result<()>
{
	pretty_env_logger::init();

	// Read the config file and the secrets provided through the environment
	let config = Config::from_file("config.yaml")?;
	let secrets = github_api::Secrets::from_env()?;

	let listen_address = config.listen_address;

	// Initialize a new GitHub API client authenticating with the configured access token
	let github_api_client = github_api::Client::new(config.github_api, secrets)?;

	log::info!("listening for incoming webhook events on {listen_address}");
	warp::serve(routes(github_api_client)).run(listen_address).await;

	Ok(())
}

/// All routes served by this application: a single webhook endpoint for repository events, with
/// all rejected requests turned into plain-text responses.
fn routes(github_api_client: github_api::Client)
	-> impl warp::Filter<Extract = impl warp::Reply, Error = std::convert::Infallible> + Clone
{
	use warp::Filter as _;

	let repository_event_route =
		// Only listen for requests to the root path
		warp::path::end()
		// Only listen for POST requests
		.and(warp::post())
		// Only listen for repository lifecycle events
		.and(warp::header::exact_ignore_case("x-github-event", "repository"))
		// Reject payloads larger than 256 kB, which should be enough for all valid requests
		.and(warp::body::content_length_limit(256 * 1024))
		// Authenticate and decode the payload and pass it on along with the GitHub API client
		.and(github_api::with_validated_payload_and_client(github_api_client))
		// Forward request to request handler
		.and_then(handle_repository_event);

	repository_event_route
		.recover(handle_rejection)
}

/// Request handler for authenticated repository events.
///
/// Inspects the newly created repository through the GitHub API, protects its default branch if
/// there is an unprotected one, and files a notification issue afterwards. Every API call is
/// made exactly once; a failed call leaves the corresponding state at its default, so the
/// decision logic naturally falls through to a no-action response.
///
/// # Arguments
/// - `payload`: The decoded webhook event payload.
/// - `github_api_client`: A handle to the GitHub API client.
async fn handle_repository_event(
	payload: RepositoryEventPayload,
	github_api_client: github_api::Client)
	-> Result<impl warp::Reply, std::convert::Infallible>
{
	// Ignore all repository actions other than the creation of a repository and acknowledge the
	// event without making any API calls
	if payload.action != RepositoryAction::Created
	{
		log::debug!("unrelated repository event, ignoring");

		return Ok(plain_text_reply("Not a repo creation event. No action.",
			warp::http::StatusCode::OK));
	}

	let Repository
	{
		name: repository_name,
		owner: User{login: organization_name},
		full_name: repository_full_name,
		default_branch: reported_default_branch,
		is_private,
		created_at,
	} = payload.repository;

	log::info!("repository “{repository_full_name}” was created (private: {is_private}), \
		checking its branches");

	// A repository may well be created empty, so check whether any branch exists before trying to
	// protect one. If the call fails, no branches were seen and the repository is left untouched
	let branches: Vec<Branch> = match github_api_client.get(
		format!("repos/{organization_name}/{repository_name}/branches")).await
	{
		Ok(branches) => branches,
		Err(error) =>
		{
			log::error!("could not list branches of repository “{repository_full_name}”");
			log::error!("{:?}", anyhow::Error::from(error));
			vec![]
		},
	};

	if branches.is_empty()
	{
		log::info!("repository “{repository_full_name}” has no branches yet, nothing to protect");

		return Ok(plain_text_reply("No branch present.", warp::http::StatusCode::OK));
	}

	log::debug!("repository “{repository_full_name}” has branches {:?}",
		branches.iter().map(|branch| branch.name.as_str()).collect::<Vec<_>>());

	// The default branch name reported in the webhook payload may be stale, so resolve the
	// authoritative name from the repository metadata instead
	let default_branch_name = match github_api_client.get::<_, RepositoryMetadataResponse>(
		format!("repos/{organization_name}/{repository_name}")).await
	{
		Ok(repository_metadata) => repository_metadata.default_branch,
		Err(error) =>
		{
			log::error!("could not resolve the default branch of repository \
				“{repository_full_name}”");
			log::error!("{:?}", anyhow::Error::from(error));

			return Ok(plain_text_reply("No action taken.", warp::http::StatusCode::OK));
		},
	};

	if default_branch_name != reported_default_branch
	{
		log::debug!("webhook reported default branch “{reported_default_branch}”, but the API \
			reports “{default_branch_name}”, using the API value");
	}

	// Check whether the default branch is already protected. If the call fails, the protection
	// state stays at its default and the branch is treated as unprotected
	let default_branch_is_protected = match github_api_client.get::<_, BranchDetailResponse>(
		format!("repos/{organization_name}/{repository_name}/branches/{default_branch_name}"))
			.await
	{
		Ok(branch_detail) => branch_detail.protected,
		Err(error) =>
		{
			log::error!("could not read the protection state of branch “{default_branch_name}” \
				in repository “{repository_full_name}”");
			log::error!("{:?}", anyhow::Error::from(error));
			false
		},
	};

	if default_branch_is_protected
	{
		log::info!("default branch “{default_branch_name}” of repository \
			“{repository_full_name}” is already protected, nothing to do");

		return Ok(plain_text_reply("Default branch already protected",
			warp::http::StatusCode::OK));
	}

	// Protect the default branch with the configured policy
	let protect_branch_request =
		ProtectBranchRequest::for_policy(github_api_client.protection_policy());

	log::info!("autoprotecting branch “{default_branch_name}” of repository \
		“{repository_full_name}” with the {:?} policy", github_api_client.protection_policy());

	if let Err(error) = github_api_client.put::<_, _, IgnoreResponse>(
		format!("repos/{organization_name}/{repository_name}/branches/{default_branch_name}\
			/protection"),
		&protect_branch_request).await
	{
		log::error!("could not set up branch protection rule for branch “{default_branch_name}” \
			in repository “{repository_full_name}”");
		log::error!("{:?}", anyhow::Error::from(error));

		// The branch was left unprotected, so report that no action was taken rather than failing
		// the delivery
		return Ok(plain_text_reply("No action taken.", warp::http::StatusCode::OK));
	}

	log::info!("set up branch protection rule for branch “{default_branch_name}” in repository \
		“{repository_full_name}”");

	// Notify the configured user of the newly set-up branch protection rule. Issue creation is
	// best-effort: the protection has already been applied, so a failure here is only logged and
	// the response stays a success either way
	let issue_title = format!("Protected default branch for repo {repository_name}");
	let issue_body = format!(
		"@{}: The default branch of {repository_full_name} was automatically protected. Direct \
		pushes to it are restricted by the configured branch protection rule, so please submit \
		changes via pull requests. This repository was created at {created_at}.",
		github_api_client.mention_login());

	let create_issue_request = CreateIssueRequest
	{
		title: &issue_title,
		body: Some(&issue_body),
	};

	match github_api_client.post::<_, _, CreateIssueResponse>(
		format!("repos/{organization_name}/{repository_name}/issues"),
		&create_issue_request).await
	{
		Ok(created_issue) =>
			log::info!("created issue informing about branch protection: {}",
				created_issue.html_url),
		Err(error) =>
		{
			log::error!("could not create notification issue in repository \
				“{repository_full_name}”");
			log::error!("{:?}", anyhow::Error::from(error));
		},
	}

	Ok(plain_text_reply(format!("Applied protection for repo: {repository_full_name}"),
		warp::http::StatusCode::OK))
}

/// Request handler for all requests that were rejected previously.
///
/// # Arguments
/// - `error`: Reasons for why this request was rejected by all routes.
async fn handle_rejection(error: warp::Rejection)
	-> Result<impl warp::Reply, std::convert::Infallible>
{
	let status_code;
	let message;

	if error.is_not_found()
	{
		status_code = warp::http::StatusCode::NOT_FOUND;
		message = "not found";
	}
	else if let Some(_) = error.find::<warp::reject::MethodNotAllowed>()
	{
		status_code = warp::http::StatusCode::METHOD_NOT_ALLOWED;
		message = "method not allowed";
	}
	else if let Some(_) = error.find::<warp::reject::PayloadTooLarge>()
	{
		status_code = warp::http::StatusCode::BAD_REQUEST;
		message = "payload too large";
	}
	else if let Some(_) = error.find::<warp::reject::MissingHeader>()
	{
		status_code = warp::http::StatusCode::BAD_REQUEST;
		message = "missing webhook event header";
	}
	// Don’t treat events that we don’t react to as errors and report a 200 OK instead
	else if let Some(_) = error.find::<warp::reject::InvalidHeader>()
	{
		status_code = warp::http::StatusCode::OK;
		message = "not listening to this webhook event";
	}
	else if let Some(crate::Error::DecodePayloadBody(_)) = error.find()
	{
		status_code = warp::http::StatusCode::BAD_REQUEST;
		message = "malformed payload body";
	}
	// Requests with a missing signature are just as unauthenticated as those with a wrong one
	else if let Some(crate::Error::MissingPayloadSignature
		| crate::Error::InvalidPayloadSignature) = error.find()
	{
		status_code = warp::http::StatusCode::UNAUTHORIZED;
		message = "Signatures don't match";
	}
	// If users are able to trigger errors we did not anticipate, log the error chain so we can
	// inspect this more closely later
	else
	{
		status_code = warp::http::StatusCode::INTERNAL_SERVER_ERROR;
		message = "internal server error";

		log::error!("unhandled error: {:#?}", error);
	}

	Ok(plain_text_reply(message, status_code))
}

/// Build a plain-text HTTP response with the given status code.
#[doc(hidden)]
fn plain_text_reply<T>(body: T, status_code: warp::http::StatusCode)
	-> warp::reply::WithStatus<String>
where
	T: Into<String>
{
	warp::reply::with_status(body.into(), status_code)
}
