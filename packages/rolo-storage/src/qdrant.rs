use qdrant_client::qdrant::{Condition, Filter, Query, QueryPointsBuilder, ScoredPoint};

use crate::Result;

pub const DENSE_VECTOR_NAME: &str = "dense";
pub const OWNER_ID_FIELD: &str = "owner_id";
pub const CONTACT_ID_FIELD: &str = "contact_id";

pub struct QdrantStore {
	pub client: qdrant_client::Qdrant,
	pub collection: String,
	pub vector_dim: u32,
}
impl QdrantStore {
	pub fn new(cfg: &rolo_config::Qdrant) -> Result<Self> {
		let client = qdrant_client::Qdrant::from_url(&cfg.url).build()?;

		Ok(Self { client, collection: cfg.collection.clone(), vector_dim: cfg.vector_dim })
	}

	/// Nearest-neighbour search over the dense vector, restricted to one owner's points.
	pub async fn search_dense(
		&self,
		vector: Vec<f32>,
		limit: u32,
		owner_id: &str,
	) -> Result<Vec<ScoredPoint>> {
		let filter = Filter::must([Condition::matches(OWNER_ID_FIELD, owner_id.to_string())]);
		let search = QueryPointsBuilder::new(self.collection.clone())
			.query(Query::new_nearest(vector))
			.using(DENSE_VECTOR_NAME)
			.filter(filter)
			.with_payload(true)
			.limit(limit as u64);
		let response = self.client.query(search).await?;

		Ok(response.result)
	}
}
