//! Enumeration of the repositories a token can write patches to.

use octocrab::Octocrab;

use super::error::GitHubApiError;
use crate::types::RepoId;

const PAGE_SIZE: u8 = 100;

/// Lists every repository the authenticated user can access, in API order.
///
/// Archived repositories are left out: they reject every write.
pub async fn list_accessible_repos(client: &Octocrab) -> Result<Vec<RepoId>, GitHubApiError> {
    let mut page = 1u8;
    let mut repos = Vec::new();

    loop {
        let result = client
            .current()
            .list_repos_for_authenticated_user()
            .per_page(PAGE_SIZE)
            .page(page)
            .send()
            .await;

        match result {
            Ok(page_result) => {
                let items = page_result.items;
                let is_last_page = items.len() < usize::from(PAGE_SIZE);

                for repo in items {
                    if repo.archived.unwrap_or(false) {
                        tracing::debug!(repo = %repo.name, "Skipping archived repository");
                        continue;
                    }
                    let Some(owner) = repo.owner else {
                        tracing::warn!(repo = %repo.name, "Skipping repository without owner");
                        continue;
                    };
                    repos.push(RepoId::new(owner.login, repo.name));
                }

                if is_last_page {
                    break;
                }
                page += 1;
            }
            Err(e) => return Err(GitHubApiError::from_octocrab(e)),
        }
    }

    Ok(repos)
}
