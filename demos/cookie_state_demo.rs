use gosub_cookie_state::{CookieState, CookieStateOptions, Environment};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::watch;

#[derive(Debug, Serialize, Deserialize)]
struct User {
    name: String,
    age: u32,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    // Run the same flow on a page with the native cookie store, and on one that only has
    // document.cookie (where changes are picked up by polling).
    run("native cookie store", Environment::new()).await?;
    run("document.cookie fallback", Environment::without_cookie_store()).await?;

    Ok(())
}

async fn run(label: &str, env: Environment) -> anyhow::Result<()> {
    println!("== {}", label);

    let default = serde_json::to_string(&User {
        name: "John Doe".into(),
        age: 30,
    })?;
    let options = CookieStateOptions::with_poll_interval_ms(100);

    let mut profile = CookieState::activate(&env, "user-1", Some(default), options);
    let mut rx = profile.watch();
    println!("first value ({}): {:?}", profile.status(), profile.value());

    // Nothing stored yet, so the first read reports no cookie at all
    wait_until(&mut rx, None).await?;
    println!("after first read ({}): {:?}", profile.status(), profile.value());

    let jane = serde_json::to_string(&User {
        name: "Jane".into(),
        age: 25,
    })?;
    profile.update(jane.clone()).await?;
    wait_until(&mut rx, Some(jane.as_str())).await?;
    let user: User = serde_json::from_str(&profile.value().unwrap_or_default())?;
    println!("after update: {:?}", user);

    // Another tab of the same site writes the cookie directly
    let other_tab = env.new_tab();
    if let Some(document) = other_tab.document() {
        document.set_cookie(r#"user-1={"name":"Max","age":41}; path=/"#)?;
    }
    rx.changed().await?;
    println!("after external write: {:?}", profile.value());

    profile.delete().await?;
    wait_until(&mut rx, None).await?;
    println!("after delete: {:?}", profile.value());

    profile.dispose();
    println!("disposed ({})", profile.status());

    Ok(())
}

async fn wait_until(rx: &mut watch::Receiver<Option<String>>, expected: Option<&str>) -> anyhow::Result<()> {
    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|v| v.as_deref() == expected)).await??;
    Ok(())
}
