use crate::commands::{self, CommandResult, StepError};
use tably_db::repositories::SqlCatalogRepository;
use tably_db::{fixtures, migrations};

pub fn run() -> CommandResult {
    let config = match commands::load_config("seed") {
        Ok(config) => config,
        Err(result) => return result,
    };
    let runtime = match commands::current_thread_runtime("seed") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let pool = commands::open_pool(&config).await?;

        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;

        let catalog = SqlCatalogRepository::new(pool.clone());
        let seeded = fixtures::seed_demo_menu(&catalog)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), 6u8))?;

        pool.close().await;
        Ok::<usize, StepError>(seeded)
    });

    match result {
        Ok(seeded) => CommandResult::success(
            "seed",
            format!("demo menu loaded: {seeded} items upserted (idempotent)"),
        ),
        Err(step) => CommandResult::from_step("seed", step),
    }
}
