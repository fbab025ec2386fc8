//! Thin REST accessors over the Agora resource endpoints.

use agora_protocol::{FOLDER_URL, Folder, FolderItem, PROJECT_URL, Project};
use tracing::debug;

use crate::{Client, ClientError, Connection};

/// Entry point for the Agora REST surface.
pub struct Agora {
    client: Client,
}

impl Agora {
    /// Wraps an existing client.
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Connects with an API key and verifies the credentials up front.
    pub async fn create(url: &str, api_key: &str, verify_cert: bool) -> Result<Self, ClientError> {
        let client = Client::new(url, Connection::ApiKey(api_key.to_string()), verify_cert)?;
        client.check_connection().await?;
        debug!(url = %client.base_url(), "connected to Agora");
        Ok(Self { client })
    }

    /// Resolves an API key from username and password.
    pub async fn get_api_key(
        url: &str,
        username: &str,
        password: &str,
        verify_cert: bool,
    ) -> Result<String, ClientError> {
        let client = Client::new(
            url,
            Connection::Password {
                username: username.to_string(),
                password: password.to_string(),
            },
            verify_cert,
        )?;
        client.api_key().await
    }

    /// The underlying HTTP client.
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Lists all projects visible to the user.
    pub async fn projects(&self) -> Result<Vec<Project>, ClientError> {
        self.client.get_json(PROJECT_URL).await
    }

    /// Fetches a single project.
    pub async fn project(&self, id: i64) -> Result<Project, ClientError> {
        self.client.get_json(&format!("{PROJECT_URL}{id}/")).await
    }

    /// Fetches a single folder.
    pub async fn folder(&self, id: i64) -> Result<Folder, ClientError> {
        self.client.get_json(&format!("{FOLDER_URL}{id}/")).await
    }

    /// Lists the items of a folder.
    pub async fn folder_items(&self, id: i64) -> Result<Vec<FolderItem>, ClientError> {
        // The explicit limit keeps the server from paginating the listing.
        self.client
            .get_json(&format!("{FOLDER_URL}{id}/items/?limit=10000000000"))
            .await
    }

    /// Lists the folders nested directly under a folder.
    pub async fn subfolders(&self, id: i64) -> Result<Vec<Folder>, ClientError> {
        let items = self.folder_items(id).await?;
        Ok(items
            .iter()
            .filter_map(FolderItem::folder_content)
            .collect())
    }
}
