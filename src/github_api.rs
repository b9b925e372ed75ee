/// Configuration of the GitHub API client.
#[derive(serde::Deserialize)]
pub struct Config
{
	/// The base URL of the GitHub API server with a trailing slash (optional, default:
	/// <https://api.github.com/>).
	#[serde(default = "github_com_api_base_url")]
	base_url: url::Url,
	/// Upper bound on the duration of a single GitHub API call, in seconds (optional, default:
	/// 10). A timed-out call is treated like any other failed call.
	#[serde(default = "default_request_timeout_seconds")]
	request_timeout_seconds: u64,
	/// The branch protection policy to apply to new default branches (optional, default:
	/// `require_review`).
	#[serde(default)]
	protection_policy: crate::ProtectionPolicy,
}

#[doc(hidden)]
fn github_com_api_base_url() -> url::Url
{
	url::Url::parse("https://api.github.com/")
		.expect("this call is infallible because we know the URL to be well-formed")
}

#[doc(hidden)]
fn default_request_timeout_seconds() -> u64
{
	10
}

/// Secrets supplied through the environment rather than the config file, so that they never end
/// up hard-coded or committed alongside the configuration.
pub struct Secrets
{
	/// Token used to authenticate API calls to the GitHub server.
	auth_token: secstr::SecUtf8,
	/// Shared secret the GitHub server uses to sign webhook payloads sent to this service.
	webhook_secret: secstr::SecUtf8,
	/// Login of the user to mention in created notification issues.
	mention_login: String,
}

impl Secrets
{
	/// Read all secrets from the environment. Every variable is required.
	pub fn from_env() -> Result<Self, crate::Error>
	{
		Ok(Self
		{
			auth_token: secstr::SecUtf8::from(required_environment_variable("GITHUB_TOKEN")?),
			webhook_secret:
				secstr::SecUtf8::from(required_environment_variable("GITHUB_WEBHOOK_SECRET")?),
			mention_login: required_environment_variable("ISSUE_MENTION_LOGIN")?,
		})
	}
}

#[doc(hidden)]
fn required_environment_variable(name: &'static str) -> Result<String, crate::Error>
{
	std::env::var(name).map_err(|_| crate::Error::MissingEnvironmentVariable{name})
}

/// A GitHub API client that authenticates with a GitHub server using a plain access token.
///
/// Every API call is attempted exactly once and bounded by the configured timeout. There is
/// deliberately no retry logic: a failed call is reported to the caller, which treats the call as
/// if it never happened and decides on that basis.
///
/// The client can safely be shared between threads, which is achieved by internally using
/// thread-safe handles to the underlying data structures. This allows the client to be used in
/// request handlers asynchronously and concurrently.
#[derive(Clone)]
pub struct Client
{
	#[doc(hidden)]
	config: std::sync::Arc<Config>,
	#[doc(hidden)]
	secrets: std::sync::Arc<Secrets>,
	#[doc(hidden)]
	reqwest_client: reqwest::Client,
}

impl Client
{
	/// Initialize a new GitHub API client with a given configuration and set of secrets.
	pub fn new(config: Config, secrets: Secrets) -> Result<Self, crate::Error>
	{
		let reqwest_client = reqwest::ClientBuilder::new()
			// Set a recognizable user agent to get meaningful debugging information from GitHub
			.user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
			// Bound every API call so a stalled connection can’t hang a webhook delivery
			.timeout(std::time::Duration::from_secs(config.request_timeout_seconds))
			.build().map_err(crate::Error::CreateHttpClient)?;

		Ok(Self
		{
			config: std::sync::Arc::new(config),
			secrets: std::sync::Arc::new(secrets),
			reqwest_client,
		})
	}

	/// The branch protection policy this client’s deployment is configured to apply.
	pub fn protection_policy(&self) -> crate::ProtectionPolicy
	{
		self.config.protection_policy
	}

	/// The login of the user to mention in created notification issues.
	pub fn mention_login(&self) -> &str
	{
		&self.secrets.mention_login
	}

	/// Make an HTTP request to the GitHub API.
	///
	/// # Arguments
	/// - `method`: The HTTP method to use (example: [reqwest::Method::POST]).
	/// - `endpoint`: The API endpoint (without host and leading slash, example:
	///   `repos/example-organization/example-repository`).
	/// - `body`: A serializable type containing the request body.
	pub async fn request<S, B, R>(&self, method: reqwest::Method, endpoint: S, body: Option<&B>)
		-> Result<R, crate::Error>
	where
		S: AsRef<str>,
		B: serde::Serialize,
		R: serde::de::DeserializeOwned,
	{
		// Build the API endpoint URL from the base URL and the endpoint path
		let url = self.config.base_url.join(endpoint.as_ref()).map_err(crate::Error::ParseUrl)?;
		let mut request = self.reqwest_client.request(method, url);

		if let Some(body) = body
		{
			// Append the request body if provided
			request = request.json(&body);
		}

		let response = request
			// Provide the access token using the Authentication header
			.bearer_auth(self.secrets.auth_token.unsecure())
			// Request the v3 REST API, as recommended by GitHub’s documentation
			.header(reqwest::header::ACCEPT, "application/vnd.github.v3+json")
			// Send the request
			.send().await.map_err(crate::Error::MakeGitHubApiRequest)?;

		// Return an error if there was a client error according to the response’s HTTP status
		if response.status().is_client_error()
		{
			let status_code = response.status();
			let url = response.url().to_owned();

			// Decode the body for debugging purposes
			let response_body =
				response.text().await.map_err(crate::Error::MakeGitHubApiRequest)?;

			return Err(crate::Error::ReceivedGitHubApiClientError{status_code, url, response_body});
		}

		let mut response_body = response
			// Return an error if there was a server error according to the response’s HTTP status
			.error_for_status().map_err(crate::Error::MakeGitHubApiRequest)?
			// Read the full response if there was no server error
			.bytes().await.map_err(crate::Error::MakeGitHubApiRequest)?;

		// Allow deserializing empty responses as empty dictionaries instead, as empty strings are
		// invalid JSON
		if response_body.is_empty()
		{
			response_body = "{}".as_bytes().into();
		}

		serde_json::from_slice(&response_body).map_err(crate::Error::DecodeGitHubApiResponseBody)
	}

	/// Make an HTTP GET request to the GitHub API (for arguments, see [Client::request]).
	pub async fn get<S, R>(&self, endpoint: S) -> Result<R, crate::Error>
	where
		S: AsRef<str>,
		R: serde::de::DeserializeOwned,
	{
		self.request(reqwest::Method::GET, endpoint, NO_BODY).await
	}

	/// Make an HTTP POST request to the GitHub API (for arguments, see [Client::request]).
	pub async fn post<S, B, R>(&self, endpoint: S, body: &B) -> Result<R, crate::Error>
	where
		S: AsRef<str>,
		B: serde::Serialize,
		R: serde::de::DeserializeOwned,
	{
		self.request(reqwest::Method::POST, endpoint, Some(body)).await
	}

	/// Make an HTTP PUT request to the GitHub API (for arguments, see [Client::request]).
	pub async fn put<S, B, R>(&self, endpoint: S, body: &B) -> Result<R, crate::Error>
	where
		S: AsRef<str>,
		B: serde::Serialize,
		R: serde::de::DeserializeOwned,
	{
		self.request(reqwest::Method::PUT, endpoint, Some(body)).await
	}

	/// Build a client for exercising request handlers in tests, without touching the environment.
	#[cfg(test)]
	pub(crate) fn for_tests(
		base_url: url::Url,
		webhook_secret: &str,
		protection_policy: crate::ProtectionPolicy)
		-> Self
	{
		let config = Config
		{
			base_url,
			request_timeout_seconds: 5,
			protection_policy,
		};

		let secrets = Secrets
		{
			auth_token: secstr::SecUtf8::from("test-token"),
			webhook_secret: secstr::SecUtf8::from(webhook_secret),
			mention_login: "octocat-admin".to_string(),
		};

		Self::new(config, secrets)
			.expect("this call is infallible because the test client configuration is well-formed")
	}
}

/// When making requests without a request body, we don’t care which type is used to represent it.
/// However, the compiler needs to know some type at compile time. This alias is used in order not
/// to have to spell out the dummy type.
pub const NO_BODY: Option<&()> = None;

/// Verify a webhook event payload by checking the provided signature.
#[doc(hidden)]
fn verify_payload_signature(
	provided_signature: Option<String>,
	payload: &[u8],
	secret: &str)
	-> Result<(), crate::Error>
{
	// A valid payload signature is always required. If none is provided, reject the request
	let provided_signature = provided_signature.ok_or(crate::Error::MissingPayloadSignature)?;

	// Only HMAC-SHA-1 signatures are supported, reject anything else
	let provided_signature = provided_signature.strip_prefix("sha1=")
		.ok_or(crate::Error::InvalidPayloadSignature)?;

	use hmac::Mac as _;

	// Compute the expected signature over the exact raw payload bytes
	let mut mac = hmac::Hmac::<sha1::Sha1>::new_from_slice(secret.as_bytes())
		.expect("this call is infallible because HMAC supports keys of arbitrary size");

	mac.update(payload);

	let expected_signature = mac.finalize().into_bytes();
	let expected_signature = hex::encode(&expected_signature);

	// Compare the provided signature with what we expect it to be. Use a secure string wrapper that
	// provides a constant-time equality comparator to prevent timing attacks
	let provided_signature = secstr::SecStr::from(provided_signature);
	let expected_signature = secstr::SecStr::from(expected_signature);

	if provided_signature == expected_signature
	{
		log::debug!("successfully verified payload signature");
		Ok(())
	}
	else
	{
		log::warn!("received payload with invalid signature");
		Err(crate::Error::InvalidPayloadSignature)
	}
}

/// [1]: <https://github.com/seanmonstar/warp/blob/3ff2eaf41eb5ac9321620e5a6434d5b5ec6f313f/examples/todos.rs#L99-L101>
/// [2]: <https://github.com/seanmonstar/warp/blob/3ff2eaf41eb5ac9321620e5a6434d5b5ec6f313f/src/filters/body.rs#L228-L237>
/// [warp] filter allowing us to extract the payload, verify its signature, and decode it from
/// JSON into a struct of the desired type. The signature is verified before the payload is even
/// looked at, so unauthenticated requests are rejected regardless of their content. Returns the
/// decoded payload and a handle to the GitHub API client for further usage as arguments to
/// subsequent handlers in that order. Inspired by the [to-do example][1] and [JSON decode
/// implementation][2] provided by [warp].
///
/// # Arguments
/// - `client`: The handle to the GitHub API client.
pub fn with_validated_payload_and_client<T>(client: Client)
	-> impl warp::Filter<Extract = (T, Client), Error = warp::Rejection> + Clone
where
	T: serde::de::DeserializeOwned + Send,
{
	use warp::Filter as _;

	warp::any()
		// Relay a handle to the client
		.map(move || {client.clone()})
		// Relay the body as raw bytes for payload signature validation and JSON decoding
		.and(warp::body::bytes())
		// Relay the payload signature header if present
		.and(warp::header::optional::<String>("x-hub-signature"))
		// Validate the payload signature and decode the body into JSON
		.and_then(
			|client: Client,
				mut bytes: warp::hyper::body::Bytes,
				provided_signature: Option<String>|
			async move
			{
				use warp::Buf as _;

				// Resize the payload buffer view to the size that was actually written
				let bytes = bytes.copy_to_bytes(bytes.remaining());

				// Authenticate the sender before decoding anything
				verify_payload_signature(provided_signature, &bytes,
					client.secrets.webhook_secret.unsecure())
						.map_err(warp::reject::custom)?;

				// Decode the payload from JSON
				let payload = serde_json::from_slice(&bytes)
					.map_err(crate::Error::DecodePayloadBody)
					.map_err(warp::reject::custom)?;

				Ok::<_, warp::Rejection>((payload, client))
			})
		// The last call returned the payload and client as a tuple, but we’d like subsequent calls
		// in the filter chain to receive them as top-level arguments and not nested within a single
		// tuple
		.untuple_one()
}

#[cfg(test)]
mod tests
{
	use super::*;

	const SECRET: &str = "s3cret";

	fn sign(secret: &str, payload: &[u8]) -> String
	{
		use hmac::Mac as _;

		let mut mac = hmac::Hmac::<sha1::Sha1>::new_from_slice(secret.as_bytes()).unwrap();
		mac.update(payload);

		format!("sha1={}", hex::encode(mac.finalize().into_bytes()))
	}

	#[test]
	fn matching_signature_is_accepted()
	{
		let payload = br#"{"action": "created"}"#;

		verify_payload_signature(Some(sign(SECRET, payload)), payload, SECRET).unwrap();
	}

	#[test]
	fn mismatching_signature_is_rejected()
	{
		let payload = br#"{"action": "created"}"#;

		assert!(matches!(
			verify_payload_signature(Some("sha1=deadbeef".to_string()), payload, SECRET),
			Err(crate::Error::InvalidPayloadSignature)));
	}

	#[test]
	fn signature_computed_with_different_secret_is_rejected()
	{
		let payload = br#"{"action": "created"}"#;

		assert!(matches!(
			verify_payload_signature(Some(sign("other-secret", payload)), payload, SECRET),
			Err(crate::Error::InvalidPayloadSignature)));
	}

	#[test]
	fn signature_over_different_payload_is_rejected()
	{
		let signature = sign(SECRET, br#"{"action": "created"}"#);

		assert!(matches!(
			verify_payload_signature(Some(signature), br#"{"action": "deleted"}"#, SECRET),
			Err(crate::Error::InvalidPayloadSignature)));
	}

	#[test]
	fn signature_without_algorithm_tag_is_rejected()
	{
		let payload = br#"{"action": "created"}"#;
		let untagged_signature = sign(SECRET, payload)
			.strip_prefix("sha1=").unwrap().to_string();

		assert!(matches!(
			verify_payload_signature(Some(untagged_signature), payload, SECRET),
			Err(crate::Error::InvalidPayloadSignature)));
	}

	#[test]
	fn signature_with_unsupported_algorithm_tag_is_rejected()
	{
		let payload = br#"{"action": "created"}"#;

		assert!(matches!(
			verify_payload_signature(
				Some("sha256=d4c6eb72b66a0b21b2e991ef5e68f6e92d43dbb4".to_string()), payload,
				SECRET),
			Err(crate::Error::InvalidPayloadSignature)));
	}

	#[test]
	fn missing_signature_is_rejected()
	{
		assert!(matches!(
			verify_payload_signature(None, br#"{"action": "created"}"#, SECRET),
			Err(crate::Error::MissingPayloadSignature)));
	}
}
