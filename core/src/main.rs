mod redis;

use std::{process, sync::Arc};

use channel::{
    CancelSubscription, Command, Consumer, Producer, RedisTransport, StartSubscription,
};
use common::{clock::Clock, env_config::Config, error::Res};
use db::repo::{Ledger, PgLedger, PgSubscriptionRepository};
use subs::{SubscriptionHandlers, SubscriptionService};
use uuid::Uuid;
use workflow::redis_store::RedisHistoryStore;

const USAGE: &str = "usage:
  worker                             run the subscription worker
  worker start <user_id>             publish a StartSubscription command
  worker cancel <sub_id> <user_id>   publish a CancelSubscription command
  worker credit <user_id> <amount>   top up a user's balance";

enum Cli {
    Worker,
    Start(Uuid),
    Cancel(Uuid, Uuid),
    Credit(Uuid, i64),
}

fn parse_args(args: &[String]) -> Result<Cli, String> {
    let uuid = |s: &String| Uuid::parse_str(s).map_err(|e| format!("invalid id {}: {}", s, e));
    match args {
        [] => Ok(Cli::Worker),
        [cmd] if cmd == "worker" => Ok(Cli::Worker),
        [cmd, user_id] if cmd == "start" => Ok(Cli::Start(uuid(user_id)?)),
        [cmd, sub_id, user_id] if cmd == "cancel" => Ok(Cli::Cancel(uuid(sub_id)?, uuid(user_id)?)),
        [cmd, user_id, amount] if cmd == "credit" => {
            let amount = amount
                .parse()
                .map_err(|e| format!("invalid amount {}: {}", amount, e))?;
            Ok(Cli::Credit(uuid(user_id)?, amount))
        }
        _ => Err(USAGE.to_string()),
    }
}

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let cli = match parse_args(&args) {
        Ok(cli) => cli,
        Err(message) => {
            eprintln!("{}", message);
            process::exit(2);
        }
    };

    // get env vars
    let config = Config::from_env();

    // init logger
    logger::setup(&config).expect("Failed to set up logger");

    if let Err(e) = run(cli, config).await {
        log::error!("{}", e);
        process::exit(1);
    }
}

async fn run(cli: Cli, config: Arc<Config>) -> Res<()> {
    let pool = db::setup(&config.database_url, config.is_production()).await?;
    let redis_pool = redis::setup(&config)?;
    let transport = Arc::new(RedisTransport::new(redis_pool.clone(), &config.command_queue));

    match cli {
        Cli::Worker => worker(config, pool, redis_pool, transport).await,
        Cli::Start(user_id) => {
            Producer::new(transport)
                .send(&Command::Start(StartSubscription { user_id }))
                .await
        }
        Cli::Cancel(subscription_id, user_id) => {
            Producer::new(transport)
                .send(&Command::Cancel(CancelSubscription {
                    subscription_id,
                    user_id,
                }))
                .await
        }
        Cli::Credit(user_id, amount) => {
            let balance = PgLedger::new(pool).credit(user_id, amount).await?;
            log::info!("balance credited: user_id={}, balance={}", user_id, balance);
            Ok(())
        }
    }
}

async fn worker(
    config: Arc<Config>,
    pool: sqlx::PgPool,
    redis_pool: deadpool_redis::Pool,
    transport: Arc<RedisTransport>,
) -> Res<()> {
    let service = Arc::new(SubscriptionService::new(
        Arc::new(PgSubscriptionRepository::new(pool.clone())),
        Arc::new(PgLedger::new(pool)),
        Arc::new(RedisHistoryStore::new(redis_pool, &config.workflow_prefix)),
        config.billing.clone(),
        &config.workflow,
        Clock::new(),
    ));

    let resumed = service.recover().await?;
    let requeued = transport.requeue_unacked().await?;
    log::info!(
        "subscriptions worker starting: environment={}, queue={}, resumed_workflows={}, requeued_messages={}",
        config.environment,
        config.command_queue,
        resumed,
        requeued
    );

    let consumer = Consumer::new(transport);
    let handlers = SubscriptionHandlers::new(service);

    tokio::select! {
        result = consumer.listen(&handlers) => result,
        _ = tokio::signal::ctrl_c() => {
            log::info!("shutdown requested, stopping worker");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn defaults_to_worker() {
        assert!(matches!(parse_args(&args(&[])), Ok(Cli::Worker)));
        assert!(matches!(parse_args(&args(&["worker"])), Ok(Cli::Worker)));
    }

    #[test]
    fn parses_commands() {
        let (sub, user) = (Uuid::new_v4(), Uuid::new_v4());
        let cancel = parse_args(&args(&["cancel", &sub.to_string(), &user.to_string()]));
        assert!(matches!(cancel, Ok(Cli::Cancel(s, u)) if s == sub && u == user));

        let credit = parse_args(&args(&["credit", &user.to_string(), "100"]));
        assert!(matches!(credit, Ok(Cli::Credit(u, 100)) if u == user));
    }

    #[test]
    fn rejects_bad_input() {
        assert!(parse_args(&args(&["start", "nope"])).is_err());
        assert!(parse_args(&args(&["credit", &Uuid::new_v4().to_string(), "ten"])).is_err());
        assert!(parse_args(&args(&["refund"])).is_err());
    }
}
