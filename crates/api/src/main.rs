use std::sync::Arc;

use anyhow::Context;

use campusops_auth::Actor;
use campusops_core::{DomainId, FacultyId, StudentId, SystemClock, UserId};
use campusops_infra::{
    AppConfig, InMemoryLendingStore, LendingService, LendingStore, PostgresLendingStore,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    campusops_observability::init();

    let config = AppConfig::from_env().context("invalid configuration")?;

    let store: Arc<dyn LendingStore> = match config.database_url.as_deref() {
        Some(url) => {
            let store = PostgresLendingStore::connect(url)
                .await
                .context("failed to connect to postgres")?;
            store.migrate().await.context("failed to apply schema")?;
            tracing::info!("using postgres store");
            Arc::new(store)
        }
        None => {
            tracing::warn!("DATABASE_URL not set; using in-memory store with demo users");
            Arc::new(demo_store()?)
        }
    };

    let service = LendingService::new(store, config.policy, Arc::new(SystemClock));
    let app = campusops_api::app::build_app(Arc::new(service));

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!(
        addr = %listener.local_addr()?,
        reservation_window_secs = config.policy.reservation_window.num_seconds(),
        loan_period_days = config.policy.loan_period.num_days(),
        fine_per_day = %config.policy.fine_per_day,
        "listening"
    );

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}

/// An in-memory store seeded with one actor per role, so the API is usable
/// without a database. The user ids are logged at startup.
fn demo_store() -> anyhow::Result<InMemoryLendingStore> {
    let store = InMemoryLendingStore::new();
    let actors = [
        Actor::Admin { user_id: UserId::new() },
        Actor::Faculty {
            user_id: UserId::new(),
            faculty_id: FacultyId::new(),
            coordinated_domains: vec![DomainId::new()],
        },
        Actor::Student {
            user_id: UserId::new(),
            student_id: StudentId::new(),
        },
    ];

    for actor in actors {
        tracing::info!(role = %actor.role(), user_id = %actor.user_id(), "demo user");
        store.register_actor(actor)?;
    }
    Ok(store)
}
