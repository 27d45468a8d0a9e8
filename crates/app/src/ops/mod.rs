pub mod cat;
pub mod check;
pub mod delegate;
pub mod did;
pub mod init;
pub mod link;
pub mod ls;
pub mod receive;
pub mod share;
pub mod version;
pub mod write;

pub use cat::Cat;
pub use check::Check;
pub use delegate::Delegate;
pub use did::Did;
pub use init::Init;
pub use link::Link;
pub use ls::Ls;
pub use receive::Receive;
pub use share::Share;
pub use version::Version;
pub use write::Write;

#[cfg(test)]
mod test {
    use super::*;
    use crate::op::{Op, OpContext};

    fn write(path: &str, content: &str) -> Write {
        Write {
            path: path.to_string(),
            content: Some(content.to_string()),
            file: None,
        }
    }

    async fn init(ctx: &OpContext, username: Option<&str>) {
        Init {
            username: username.map(str::to_string),
            log_level: "warn".to_string(),
        }
        .execute(ctx)
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_write_read_and_share() {
        let temp = tempfile::TempDir::new().unwrap();
        let alice = OpContext::new(Some(temp.path().join("alice")));
        init(&alice, Some("alice")).await;

        write("/notes/todo.txt", "milk").execute(&alice).await.unwrap();
        let content = Cat {
            path: "/notes/todo.txt".to_string(),
        }
        .execute(&alice)
        .await
        .unwrap();
        assert_eq!(content, "milk");

        let root = Ls {
            path: "/".to_string(),
        }
        .execute(&alice)
        .await
        .unwrap();
        assert_eq!(root, "notes/");

        let share = Share {
            paths: vec!["/notes/todo.txt".to_string()],
            with: "did:key:z6MkRecipient".to_string(),
        }
        .execute(&alice)
        .await;
        // an unparseable recipient DID fails before the counter moves
        assert!(share.is_err());

        let bob = OpContext::new(Some(temp.path().join("bob")));
        init(&bob, Some("bob")).await;
        let bob_did = Did.execute(&bob).await.unwrap();
        let shared = Share {
            paths: vec!["/notes/todo.txt".to_string()],
            with: bob_did,
        }
        .execute(&alice)
        .await
        .unwrap();
        assert!(shared.contains("as share 1"));
    }

    #[tokio::test]
    async fn test_link_second_device() {
        let temp = tempfile::TempDir::new().unwrap();
        let phone = OpContext::new(Some(temp.path().join("phone")));
        let laptop = OpContext::new(Some(temp.path().join("laptop")));
        init(&phone, Some("alice")).await;
        init(&laptop, None).await;

        let phone_did = Did.execute(&phone).await.unwrap();
        let laptop_did = Did.execute(&laptop).await.unwrap();
        let check = Check { username: None };
        assert!(check
            .execute(&phone)
            .await
            .unwrap()
            .ends_with("can act for alice"));

        let data = Delegate {
            audience: laptop_did.clone(),
        }
        .execute(&phone)
        .await
        .unwrap();
        let output = Link {
            username: "alice".to_string(),
            data: Some(data),
            file: None,
            data_root: None,
        }
        .execute(&laptop)
        .await
        .unwrap();
        assert!(output.contains(&phone_did));

        assert_eq!(
            check.execute(&laptop).await.unwrap(),
            format!("{} can act for alice", laptop_did)
        );
        let other = Check {
            username: Some("bob".to_string()),
        };
        assert!(other.execute(&laptop).await.unwrap().contains("cannot"));
    }

    #[tokio::test]
    async fn test_link_rejects_garbage() {
        let temp = tempfile::TempDir::new().unwrap();
        let laptop = OpContext::new(Some(temp.path().join("laptop")));
        init(&laptop, None).await;

        let err = Link {
            username: "alice".to_string(),
            data: Some(r#"{"readKey":"k","ucan":"not.a.token"}"#.to_string()),
            file: None,
            data_root: None,
        }
        .execute(&laptop)
        .await
        .unwrap_err();
        assert!(err
            .to_string()
            .contains("Given ucan is invalid: not.a.token"));
    }
}
