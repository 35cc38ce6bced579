use crate::client::BackendClient;
use crate::errors::{AppError, ResultExt};
use crate::models::{AuthUser, Connection, FounderProfile, NewConnection, NewFounderProfile, Session, StorageObject};
use crate::schema::{self, connections, founders};
use tracing;
use uuid::Uuid;

/// Every probe identity's email starts with this, so leftovers can be found and removed.
pub const PROBE_EMAIL_PREFIX: &str = "probe+";

pub fn probe_email(domain: &str) -> String {
    format!("{}{}@{}", PROBE_EMAIL_PREFIX, Uuid::new_v4().simple(), domain)
}

pub fn probe_password() -> String {
    format!("Probe-{}!", Uuid::new_v4().simple())
}

pub fn is_probe_email(email: &str) -> bool {
    email.starts_with(PROBE_EMAIL_PREFIX)
}

/// A throwaway identity with a live session.
#[derive(Clone)]
pub struct TestUser {
    pub email: String,
    pub password: String,
    pub user: AuthUser,
    pub session: Session,
}

impl TestUser {
    pub fn id(&self) -> Uuid {
        self.user.id
    }
}

/// Something a script created and must remove.
enum Created {
    User(Uuid),
    Founder { id: Uuid, via: BackendClient },
    Connection { id: Uuid, via: BackendClient },
    Object { bucket: String, path: String, via: BackendClient },
}

/// Tracks created users, rows and objects, and removes them in reverse order.
///
/// Rows and objects are deleted with the service-role client when one is available,
/// otherwise with the client that created them. Without the service role a delete that
/// removes nothing counts as a failure, since RLS hides refused deletes as empty results.
/// Users can only be deleted with the service role.
pub struct Fixtures {
    admin: Option<BackendClient>,
    created: Vec<Created>,
}

impl Fixtures {
    pub fn new(admin: Option<BackendClient>) -> Self {
        Self {
            admin,
            created: Vec::new(),
        }
    }

    pub fn tracked(&self) -> usize {
        self.created.len()
    }

    /// Creates a confirmed user and signs it in.
    ///
    /// With a service-role client the user is created through the admin API, which
    /// skips email confirmation. Otherwise it goes through public sign-up, which only
    /// yields a session when the project auto-confirms emails.
    pub async fn create_user(
        &mut self,
        anon: &BackendClient,
        email_domain: &str,
    ) -> Result<TestUser, AppError> {
        let email = probe_email(email_domain);
        let password = probe_password();

        let user = match self.admin {
            Some(ref admin) => admin
                .auth()
                .admin_create_user(&email, &password, true)
                .await
                .with_context(|| format!("creating {}", email))?,
            None => {
                let outcome = anon
                    .auth()
                    .sign_up(&email, &password)
                    .await
                    .with_context(|| format!("signing up {}", email))?;
                self.created.push(Created::User(outcome.user.id));
                if let Some(session) = outcome.session {
                    return Ok(TestUser {
                        email,
                        password,
                        user: outcome.user,
                        session,
                    });
                }
                outcome.user
            }
        };

        if self.admin.is_some() {
            self.created.push(Created::User(user.id));
        }

        let session = anon
            .auth()
            .sign_in_with_password(&email, &password)
            .await
            .with_context(|| format!("signing in {}", email))?;

        Ok(TestUser {
            email,
            password,
            user,
            session,
        })
    }

    /// Inserts a founder row as `client` and tracks it.
    pub async fn create_founder(
        &mut self,
        client: &BackendClient,
        profile: &NewFounderProfile,
    ) -> Result<FounderProfile, AppError> {
        let rows: Vec<FounderProfile> = client
            .from(schema::FOUNDERS_TABLE)
            .insert(profile)
            .await
            .with_context(|| format!("inserting founder for {}", profile.user_id))?;

        let row = rows.into_iter().next().ok_or_else(|| {
            AppError::Cardinality("founder insert returned no row".to_string())
        })?;
        self.track_founder(row.id, client);
        Ok(row)
    }

    pub async fn create_connection(
        &mut self,
        client: &BackendClient,
        connection: &NewConnection,
    ) -> Result<Connection, AppError> {
        let rows: Vec<Connection> = client
            .from(schema::CONNECTIONS_TABLE)
            .insert(connection)
            .await
            .context("inserting connection")?;

        let row = rows.into_iter().next().ok_or_else(|| {
            AppError::Cardinality("connection insert returned no row".to_string())
        })?;
        self.track_connection(row.id, client);
        Ok(row)
    }

    pub fn track_user(&mut self, id: Uuid) {
        self.created.push(Created::User(id));
    }

    pub fn track_founder(&mut self, id: Uuid, via: &BackendClient) {
        self.created.push(Created::Founder {
            id,
            via: via.clone(),
        });
    }

    pub fn track_connection(&mut self, id: Uuid, via: &BackendClient) {
        self.created.push(Created::Connection {
            id,
            via: via.clone(),
        });
    }

    pub fn track_object(&mut self, bucket: &str, path: &str, via: &BackendClient) {
        self.created.push(Created::Object {
            bucket: bucket.to_string(),
            path: path.to_string(),
            via: via.clone(),
        });
    }

    /// Stops tracking a founder row that was already deleted.
    pub fn forget_founder(&mut self, id: Uuid) {
        self.created
            .retain(|item| !matches!(item, Created::Founder { id: tracked, .. } if *tracked == id));
    }

    pub fn forget_object(&mut self, bucket: &str, path: &str) {
        self.created.retain(|item| {
            !matches!(item, Created::Object { bucket: b, path: p, .. } if b == bucket && p == path)
        });
    }

    /// Removes everything tracked, newest first. Failures are logged and skipped.
    ///
    /// Returns the number of items that could not be removed.
    pub async fn cleanup(&mut self) -> usize {
        let mut failures = 0;
        let total = self.created.len();

        let as_admin = self.admin.is_some();

        while let Some(item) = self.created.pop() {
            let result = match item {
                Created::Connection { id, via } => {
                    let client = self.admin.as_ref().unwrap_or(&via);
                    let label = format!("connection {}", id);
                    client
                        .from(schema::CONNECTIONS_TABLE)
                        .eq(connections::ID, id)
                        .delete::<Connection>()
                        .await
                        .with_context(|| format!("deleting {}", label))
                        .and_then(|rows| confirm_removed(as_admin, client, &label, rows.len()))
                }
                Created::Founder { id, via } => {
                    let client = self.admin.as_ref().unwrap_or(&via);
                    let label = format!("founder {}", id);
                    client
                        .from(schema::FOUNDERS_TABLE)
                        .eq(founders::ID, id)
                        .delete::<FounderProfile>()
                        .await
                        .with_context(|| format!("deleting {}", label))
                        .and_then(|rows| confirm_removed(as_admin, client, &label, rows.len()))
                }
                Created::Object { bucket, path, via } => {
                    let client = self.admin.as_ref().unwrap_or(&via);
                    let label = format!("object {}/{}", bucket, path);
                    client
                        .storage()
                        .remove(&bucket, &[path.as_str()])
                        .await
                        .with_context(|| format!("removing {}", label))
                        .and_then(|objects: Vec<StorageObject>| {
                            confirm_removed(as_admin, client, &label, objects.len())
                        })
                }
                Created::User(id) => match self.admin {
                    Some(ref admin) => admin
                        .auth()
                        .admin_delete_user(id)
                        .await
                        .with_context(|| format!("deleting user {}", id)),
                    None => Err(AppError::Config(format!(
                        "user {} left behind: no service-role key",
                        id
                    ))),
                },
            };

            if let Err(e) = result {
                tracing::warn!("Cleanup step failed: {}", e);
                failures += 1;
            }
        }

        if failures == 0 {
            tracing::info!("Cleanup removed {} item(s)", total);
        } else {
            tracing::warn!("Cleanup finished with {}/{} failure(s)", failures, total);
        }
        failures
    }
}

/// An empty delete is fine for the service role (the item was already gone) but means
/// RLS filtered the delete for anyone else.
fn confirm_removed(
    as_admin: bool,
    client: &BackendClient,
    label: &str,
    removed: usize,
) -> Result<(), AppError> {
    if removed > 0 {
        return Ok(());
    }
    if as_admin {
        tracing::debug!("{} already gone", label);
        return Ok(());
    }
    Err(AppError::PermissionDenied(format!(
        "{} still present: delete as {} removed 0 rows",
        label,
        client.identity()
    )))
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_emails_are_unique_and_tagged() {
        let a = probe_email("example.com");
        let b = probe_email("example.com");
        assert_ne!(a, b);
        assert!(is_probe_email(&a));
        assert!(a.ends_with("@example.com"));
        assert!(!is_probe_email("founder@example.com"));
    }

    #[test]
    fn test_probe_password_is_strong_enough() {
        let pw = probe_password();
        assert!(pw.len() >= 12);
        assert!(pw.chars().any(|c| c.is_ascii_uppercase()));
        assert!(pw.chars().any(|c| !c.is_alphanumeric()));
    }

    #[test]
    fn test_forget_drops_only_the_matching_item() {
        let client = BackendClient::with_keys("https://abc.supabase.co", "anon-key", None).unwrap();
        let kept = Uuid::new_v4();
        let gone = Uuid::new_v4();
        let mut fixtures = Fixtures::new(None);
        fixtures.track_founder(kept, &client);
        fixtures.track_founder(gone, &client);
        fixtures.track_object("avatars", "u1/a.png", &client);
        fixtures.track_object("avatars", "u1/b.png", &client);

        fixtures.forget_founder(gone);
        fixtures.forget_object("avatars", "u1/a.png");
        assert_eq!(fixtures.tracked(), 2);
        assert!(matches!(fixtures.created[0], Created::Founder { id, .. } if id == kept));
        assert!(matches!(&fixtures.created[1], Created::Object { path, .. } if path == "u1/b.png"));
    }

    #[test]
    fn test_empty_delete_is_failure_only_without_admin() {
        let client = BackendClient::with_keys("https://abc.supabase.co", "anon-key", None).unwrap();
        assert!(confirm_removed(true, &client, "founder x", 0).is_ok());
        assert!(confirm_removed(false, &client, "founder x", 1).is_ok());
        let err = confirm_removed(false, &client, "founder x", 0).unwrap_err();
        assert!(err.is_permission_denied());
        assert!(err.to_string().contains("as anonymous removed 0 rows"));
    }

    #[tokio::test]
    async fn test_cleanup_without_admin_reports_users_left_behind() {
        let mut fixtures = Fixtures::new(None);
        fixtures.track_user(Uuid::new_v4());
        assert_eq!(fixtures.tracked(), 1);
        assert_eq!(fixtures.cleanup().await, 1);
        assert_eq!(fixtures.tracked(), 0);
    }
}
