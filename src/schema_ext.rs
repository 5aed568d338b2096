use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// OpenAPI stand-in for `DateTime<Utc>` fields
#[derive(Serialize, Deserialize, ToSchema)]
#[schema(value_type = String, format = "date-time", example = "2024-03-18T09:30:00Z")]
pub struct DateTimeWrapper(pub DateTime<Utc>);

/// OpenAPI stand-in for user and notification ids
#[derive(Serialize, Deserialize, ToSchema)]
#[schema(value_type = String, format = "uuid", example = "6f1c2d3e-4b5a-4c7d-8e9f-0a1b2c3d4e5f")]
pub struct UuidWrapper(pub Uuid);
