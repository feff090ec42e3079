use crate::command::Invocation;
use crate::host::Host;
use crate::DriverError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

pub const LOGINCTL: &str = "/usr/bin/loginctl";

/// Lowest uid treated as a human login rather than a system account.
pub const MIN_HUMAN_UID: u32 = 1000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub uid: u32,
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct LoginctlUser {
    uid: u32,
    user: String,
}

/// Enumerate logged-in human users, in loginctl order.
pub fn list_users(host: &dyn Host) -> Result<Vec<User>, DriverError> {
    let invocation = Invocation::new(Path::new(LOGINCTL), ["list-users", "--output=json"]);
    let output = host
        .run(&invocation)
        .map_err(|e| DriverError::Sessions(format!("cannot run loginctl: {e}")))?;
    if !output.success() {
        return Err(DriverError::Sessions(output.combined()));
    }
    let users = parse_users(&output.stdout_lossy())?;
    debug!("found {} user session(s)", users.len());
    Ok(users)
}

pub fn parse_users(json: &str) -> Result<Vec<User>, DriverError> {
    let entries: Vec<LoginctlUser> = serde_json::from_str(json)
        .map_err(|e| DriverError::Sessions(format!("unexpected loginctl output: {e}")))?;
    Ok(entries
        .into_iter()
        .filter(|u| u.uid >= MIN_HUMAN_UID)
        .map(|u| User {
            uid: u.uid,
            name: u.user,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::ProcessOutput;
    use crate::mock::MockHost;

    #[test]
    fn parses_and_filters_system_accounts() {
        let json = r#"[
            {"uid":0,"user":"root","linger":false,"state":"online"},
            {"uid":1000,"user":"alice","linger":false,"state":"active"},
            {"uid":1001,"user":"bob","linger":true,"state":"lingering"}
        ]"#;
        let users = parse_users(json).unwrap();
        assert_eq!(
            users,
            vec![
                User {
                    uid: 1000,
                    name: "alice".to_owned()
                },
                User {
                    uid: 1001,
                    name: "bob".to_owned()
                },
            ]
        );
    }

    #[test]
    fn empty_list() {
        assert!(parse_users("[]").unwrap().is_empty());
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(matches!(
            parse_users("UID USER\n1000 alice"),
            Err(DriverError::Sessions(_))
        ));
    }

    #[test]
    fn list_users_through_host() {
        let host = MockHost::new().with_users(&[(1000, "alice")]);
        let users = list_users(&host).unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].name, "alice");
    }

    #[test]
    fn loginctl_failure_is_an_error() {
        let host = MockHost::new().respond(
            |inv| inv.program() == LOGINCTL,
            ProcessOutput::exit(1, "Failed to connect to bus"),
        );
        let err = list_users(&host).unwrap_err();
        assert!(err.to_string().contains("Failed to connect to bus"));
    }
}
