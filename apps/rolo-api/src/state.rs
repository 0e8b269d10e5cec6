use std::sync::Arc;

use rolo_config::Config;
use rolo_service::RoloService;
use rolo_storage::{db::Db, qdrant::QdrantStore};

#[derive(Clone)]
pub struct AppState {
	pub service: Arc<RoloService>,
}
impl AppState {
	/// Connects Postgres, applies the schema, and wires the default providers.
	pub async fn new(config: Config) -> color_eyre::Result<Self> {
		let db = Db::connect(&config.storage.postgres).await?;

		db.ensure_schema().await?;

		let qdrant = QdrantStore::new(&config.storage.qdrant)?;
		let service = RoloService::new(config, &db, qdrant);

		Ok(Self::from_service(service))
	}

	pub fn from_service(service: RoloService) -> Self {
		Self { service: Arc::new(service) }
	}
}
