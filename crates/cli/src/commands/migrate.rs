use crate::commands::{self, CommandResult, StepError};
use tably_db::migrations;

pub fn run() -> CommandResult {
    let config = match commands::load_config("migrate") {
        Ok(config) => config,
        Err(result) => return result,
    };
    let runtime = match commands::current_thread_runtime("migrate") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let pool = commands::open_pool(&config).await?;
        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;
        pool.close().await;
        Ok::<(), StepError>(())
    });

    match result {
        Ok(()) => CommandResult::success("migrate", "applied pending migrations"),
        Err(step) => CommandResult::from_step("migrate", step),
    }
}
