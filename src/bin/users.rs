use std::{error::Error, path::PathBuf};

use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use userbase_rs::{
    BackendKind, DEFAULT_REPOSITORY_PATH, Schema, StoreConfig, UserBackend, UserCollection,
    UserData, UserRecord, UserStore,
};

/// A utility for inspecting and seeding the user repository.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// File path to the user repository.
    #[arg(long, env = "USER_REPOSITORY", default_value = DEFAULT_REPOSITORY_PATH)]
    repository: PathBuf,

    /// How the user repository is stored.
    #[arg(long, value_enum, default_value_t = BackendKind::Json)]
    backend: BackendKind,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create an empty repository if there is none yet.
    Init,

    /// Add a user.
    Add {
        /// A field value as `name=value`, may be repeated.
        #[arg(long = "field", value_parser = parse_field)]
        fields: Vec<(String, String)>,
    },

    /// Show the first user with `value` in any field.
    Get {
        /// The field being looked up.
        field: String,

        /// The value to look for.
        value: String,

        /// Also show passwords and tokens.
        #[arg(long)]
        all_fields: bool,
    },

    /// Change fields of every user with `value` in any field.
    Update {
        /// The field being looked up.
        field: String,

        /// The value to look for.
        value: String,

        /// A new field value as `name=value`, may be repeated.
        #[arg(long = "field", value_parser = parse_field)]
        fields: Vec<(String, String)>,
    },

    /// Show every user.
    List,

    /// Remove every user.
    Clear,
}

fn main() -> Result<(), Box<dyn Error>> {
    setup_logging();

    let args = Args::parse();
    let config = StoreConfig::new(args.repository, args.backend);

    let open_store = || config.open(Schema::default());

    match args.command {
        Command::Init => {
            config.initialize_repository()?;
            println!("User repository ready at {:?}", config.repository_path);
        }
        Command::Add { fields } => {
            let mut store = open_store()?;
            let record = store.add(&into_user_data(fields))?;
            print_json(&record.visible(store.schema()))?;
        }
        Command::Get {
            field,
            value,
            all_fields,
        } => {
            let mut store = open_store()?;
            let record = find_user(&mut store, &field, &value, all_fields)?;
            print_json(&record)?;
        }
        Command::Update {
            field,
            value,
            fields,
        } => {
            open_store()?.update(&field, &value, &into_user_data(fields))?;
        }
        Command::List => {
            let mut store = open_store()?;
            let schema = store.schema().clone();
            let visible: UserCollection = store
                .all()
                .iter()
                .map(|(position, record)| (position, record.visible(&schema)))
                .collect();
            print_json(&visible)?;
        }
        Command::Clear => {
            open_store()?.clear()?;
        }
    }

    Ok(())
}

fn setup_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn parse_field(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((name, value)) if !name.is_empty() => Ok((name.to_owned(), value.to_owned())),
        _ => Err(format!("expected `name=value`, got {raw:?}")),
    }
}

/// The first user with `value` in any field, with credentials stripped unless
/// `all_fields` is set.
fn find_user<B: UserBackend>(
    store: &mut UserStore<B>,
    field: &str,
    value: &str,
    all_fields: bool,
) -> Result<UserRecord, String> {
    match store.get(field, value) {
        Some(record) if all_fields => Ok(record),
        Some(record) => Ok(record.visible(store.schema())),
        None => Err(format!("no user found with the value {value:?}")),
    }
}

fn into_user_data(fields: Vec<(String, String)>) -> UserData {
    fields.into_iter().collect()
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;
    use userbase_rs::{JsonFileBackend, Schema, UserStore};

    use super::{find_user, parse_field};

    fn store_with_alice(dir: &TempDir) -> UserStore<JsonFileBackend> {
        let path = dir.path().join("users.json");
        fs::write(
            &path,
            r#"{"1":{"username":"alice","password":"secret"}}"#,
        )
        .unwrap();

        UserStore::new(Schema::default(), JsonFileBackend::new(path))
    }

    #[test]
    fn find_user_hides_credentials_by_default() {
        let dir = TempDir::new().unwrap();
        let mut store = store_with_alice(&dir);

        let record = find_user(&mut store, "username", "alice", false).unwrap();

        assert_eq!(record.get("username"), Some("alice"));
        assert_eq!(record.get("password"), None);
    }

    #[test]
    fn find_user_shows_credentials_when_asked() {
        let dir = TempDir::new().unwrap();
        let mut store = store_with_alice(&dir);

        let record = find_user(&mut store, "username", "alice", true).unwrap();

        assert_eq!(record.get("password"), Some("secret"));
    }

    #[test]
    fn find_user_without_match_is_an_error() {
        let dir = TempDir::new().unwrap();
        let mut store = store_with_alice(&dir);

        let result = find_user(&mut store, "username", "mallory", false);

        assert_eq!(
            result,
            Err("no user found with the value \"mallory\"".to_owned())
        );
    }

    #[test]
    fn parse_field_splits_on_first_equals_sign() {
        assert_eq!(
            parse_field("password=a=b"),
            Ok(("password".to_owned(), "a=b".to_owned()))
        );
    }

    #[test]
    fn parse_field_allows_empty_value() {
        assert_eq!(
            parse_field("reset_token="),
            Ok(("reset_token".to_owned(), String::new()))
        );
    }

    #[test]
    fn parse_field_rejects_missing_name() {
        assert!(parse_field("=alice").is_err());
        assert!(parse_field("alice").is_err());
    }
}
