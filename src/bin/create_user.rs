use std::env;

use anyhow::{bail, Context};
use uuid::Uuid;

use nice_catcher::{
    auth::password::hash_password, config::AppConfig, db, init_tracing, models::NewUser,
    store::{AccountStore, PgStore},
};

/// Usage: create-user <username> <password>
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let mut args = env::args().skip(1);
    let (Some(username), Some(password)) = (args.next(), args.next()) else {
        bail!("usage: create-user <username> <password>");
    };
    let username = username.trim().to_string();
    if username.is_empty() || password.is_empty() {
        bail!("username and password must not be empty");
    }

    let config = AppConfig::from_env()?;
    let pool = db::init_pool_with_size(&config.database_url, 1)?;
    db::run_migrations(&pool)?;
    let store = PgStore::new(pool);

    if store.find_user_by_username(&username).await?.is_some() {
        bail!("user '{username}' already exists");
    }

    let password_hash = hash_password(&password).context("failed to hash password")?;
    let user = store
        .insert_user(NewUser {
            id: Uuid::new_v4(),
            username,
            password_hash,
        })
        .await?;

    tracing::info!(user_id = %user.id, username = %user.username, "user created");
    println!("{}", user.id);
    Ok(())
}
