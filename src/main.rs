use std::sync::Arc;

use clap::Parser;
use deltaimage::config::setup_logging;
use deltaimage::generation::{Generator, ModelIds};
use deltaimage::store::{DatabaseStore, ImageStore, MemoryStore};
use deltaimage::workers_ai::WorkersAiClient;
use sea_orm_migration::MigratorTrait;
use tracing::{error, info};

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    let cli = deltaimage::cli::CliOptions::parse();

    if setup_logging(cli.debug).is_err() {
        return;
    }

    let store: Arc<dyn ImageStore> = if cli.memory_store {
        info!("Keeping the latest image in memory");
        Arc::new(MemoryStore::new())
    } else {
        let db = match deltaimage::db::connect_db(&cli.database_path).await {
            Ok(db) => db,
            Err(err) => {
                error!("Database connection error: {}", err);
                return;
            }
        };

        if let Err(err) = deltaimage::db::migrations::Migrator::up(&db, None).await {
            error!("Database migration error: {}", err);
            return;
        }
        info!("Storing the latest image in {}", cli.database_path);
        Arc::new(DatabaseStore::new(db))
    };

    let model = match WorkersAiClient::new(&cli.workers_ai) {
        Ok(model) => model,
        Err(err) => {
            error!("Failed to set up Workers AI client: {}", err);
            return;
        }
    };

    let models = ModelIds {
        text_to_image: cli.workers_ai.text_model.clone(),
        image_to_image: cli.workers_ai.img2img_model.clone(),
    };
    let generator = Generator::new(Arc::new(model), store, models);

    if let Err(err) =
        deltaimage::web::setup_server(&cli.listen_address, cli.port, generator).await
    {
        error!("Application error: {}", err);
    }
}
