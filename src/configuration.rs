use std::{
    env, fs,
    ops::Deref,
    path::Path,
    sync::Arc,
};

use anyhow::Context;
use tokio::sync::Semaphore;
use tracing::warn;

use crate::{
    dao::get_path,
    error::Error,
    provider::DatabasePool,
    push::PushClient,
    types::{PushHeader, Urgency},
};

#[derive(Debug)]
pub struct AppState<T>(Arc<T>);

impl<T> AppState<T> {
    pub fn new(state: T) -> AppState<T> {
        AppState(Arc::new(state))
    }
}

impl<T> Clone for AppState<T> {
    fn clone(&self) -> AppState<T> {
        AppState(Arc::clone(&self.0))
    }
}

impl<T> Deref for AppState<T> {
    type Target = Arc<T>;

    fn deref(&self) -> &Arc<T> {
        &self.0
    }
}

#[derive(Debug)]
pub struct State {
    pub config: Config,
    pub database: DatabasePool,
    /// None when no VAPID credentials are configured; registration and
    /// listing keep working, sends report zero deliveries.
    pub push: Option<PushClient>,
    pub push_permits: Arc<Semaphore>,
}

impl State {
    pub async fn new(
        config: Config,
        database: DatabasePool,
    ) -> Result<State, Error> {
        Self::init_migrations(&database).await?;

        let push = match (&config.vapid_private_key, &config.vapid_public_key)
        {
            (Some(private_key), Some(public_key)) => Some(PushClient::new(
                private_key.clone(),
                public_key.clone(),
                config.mail_to.clone(),
                PushHeader {
                    ttl: config.push_ttl,
                    urgency: config.push_urgency.clone(),
                },
                config.timeout,
            )?),
            _ => {
                warn!("VAPID keys not found, push delivery is disabled");
                None
            },
        };

        let push_permits = Arc::new(Semaphore::new(config.max_push_tasks));

        Ok(Self {
            config,
            database,
            push,
            push_permits,
        })
    }

    async fn init_migrations(database: &DatabasePool) -> Result<(), Error> {
        let files = vec!["subscription.sql"];

        let dir = env!("CARGO_MANIFEST_DIR");

        for file in files {
            let data = get_path(dir, file)?;
            // the DDL files hold more than one statement, so they go
            // through the simple query protocol
            sqlx::raw_sql(data.as_str()).execute(&database.pool).await?;
        }

        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub server_host: String,
    pub port: u16,
    pub allowed_origins: Vec<String>,
    pub timeout: u64,
    pub max_push_tasks: usize,
    pub push_ttl: i64,
    pub push_urgency: Urgency,
    pub mail_to: String,
    pub vapid_private_key: Option<Vec<u8>>,
    pub vapid_public_key: Option<String>,
}

fn parse_config_vapid_keys(
) -> Result<(Option<Vec<u8>>, Option<String>), Error> {
    let directory = env!("CARGO_MANIFEST_DIR");
    let private_key_dir = format!("{}/cert/vapid_private.pem", directory);
    let public_key_dir = format!("{}/cert/vapid_public.b64", directory);

    if !Path::new(&private_key_dir).exists()
        || !Path::new(&public_key_dir).exists()
    {
        return Ok((None, None));
    }

    let private_key = fs::read(private_key_dir)?;
    let public_key = String::from_utf8(fs::read(public_key_dir)?)
        .context("VAPID public key is not valid UTF-8")?
        .trim()
        .to_owned();

    Ok((Some(private_key), Some(public_key)))
}

pub fn get_configuration() -> Result<Config, Error> {
    let database_url = env::var("DATABASE_URL")?;
    let server_host = env::var("SERVER_HOST")?;
    let port: u16 = env::var("PORT")?.parse()?;
    let timeout = env::var("TIMEOUT")?.parse()?;
    let max_push_tasks = env::var("MAX_PUSH_TASKS")?.parse()?;
    let push_ttl = env::var("PUSH_TTL")?.parse()?;
    let push_urgency = env::var("PUSH_URGENCY")?.parse()?;
    let mail_to = env::var("MAIL_TO")?;

    let allowed_origins = env::var("ALLOWED_ORIGINS")?
        .split(',')
        .map(|item| item.to_owned())
        .collect::<Vec<String>>();

    let (vapid_private_key, vapid_public_key) = parse_config_vapid_keys()?;

    let config = Config {
        database_url,
        server_host,
        port,
        allowed_origins,
        timeout,
        max_push_tasks,
        push_ttl,
        push_urgency,
        mail_to,
        vapid_private_key,
        vapid_public_key,
    };

    Ok(config)
}

pub fn set_configuration() -> Result<(), Error> {
    let config_file: &str = ".env";

    let directory = env!("CARGO_MANIFEST_DIR");
    let path = format!("{}/{}", directory, config_file);

    let config_string = fs::read_to_string(path)?;
    parse_config_string(config_string)?;

    Ok(())
}

fn parse_config_string(config: String) -> Result<(), Error> {
    let params: Vec<Option<(&str, &str)>> = config
        .split('\n')
        .map(|s| {
            let element = s.find('=');
            if let Some(e) = element {
                return Some(s.split_at(e));
            }
            None
        })
        .map(|value| {
            if let Some((k, v)) = value {
                return Some((k, &v[1..]));
            }
            None
        })
        .collect();

    for (key, value) in params.into_iter().flatten() {
        env::set_var(key, value);
    }

    Ok(())
}
