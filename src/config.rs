#[derive(serde::Deserialize)]
/// Top-level configuration of this application.
///
/// Only non-secret settings live in the config file. The GitHub API token, the webhook secret,
/// and the login to mention in created issues are read from the environment instead (see
/// [crate::github_api::Secrets]).
pub struct Config
{
	/// The socket address the webhook listener binds to (optional, default: `127.0.0.1:2342`).
	#[serde(default = "default_listen_address")]
	pub listen_address: std::net::SocketAddr,
	/// Configuration options specific to the GitHub API and the protection policy to apply.
	pub github_api: crate::github_api::Config,
}

#[doc(hidden)]
fn default_listen_address() -> std::net::SocketAddr
{
	([127, 0, 0, 1], 2342).into()
}

impl Config
{
	/// Attempt to read and parse the configuration from a YAML file.
	///
	/// # Arguments
	/// `path`: Path to the configuration file in YAML format.
	pub fn from_file<P>(path: P) -> Result<Self, crate::Error>
	where
		P: AsRef<std::path::Path>
	{
		let file = std::fs::File::open(&path).map_err(crate::Error::ReadConfigFile)?;
		serde_yaml::from_reader(&file).map_err(crate::Error::ParseConfigFile)
	}
}
