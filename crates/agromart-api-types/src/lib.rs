//! Request and response types exchanged with the Agromart REST API.
//!
//! Field names follow the backend's JSON exactly (`_id`, `owner_id`,
//! `stock_quantity`, ...), so these types round-trip the wire format without
//! custom adapters.

use serde::{Deserialize, Serialize};

// ============================================================================
// Users and authentication
// ============================================================================

/// Marketplace role of an authenticated user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Farmer,
    Landowner,
    Admin,
}

/// Session identity kept on the client after login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    pub role: Role,
    pub full_name: String,
}

/// Body returned by `auth/login` and `auth/signup`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthResponse {
    #[serde(default)]
    pub message: String,
    pub token: String,
    pub role: Role,
    pub user_id: String,
    pub full_name: String,
}

impl AuthResponse {
    pub fn user(&self) -> AuthUser {
        AuthUser {
            id: self.user_id.clone(),
            role: self.role,
            full_name: self.full_name.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
    pub full_name: String,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

// ============================================================================
// Addresses
// ============================================================================

/// GeoJSON point; `values` is `[longitude, latitude]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    #[serde(rename = "type")]
    pub kind: String,
    pub values: [f64; 2],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Address {
    pub street_address: String,
    pub city: String,
    pub state_province: String,
    pub postal_code: String,
    pub country: String,
    pub coordinates: Coordinates,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub landmark: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parcel_id: Option<String>,
}

/// Profile served by `profile/{user_id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(rename = "_id")]
    pub id: String,
    pub email: String,
    pub full_name: String,
    pub role: Role,
    #[serde(default)]
    pub phone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<Address>,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

/// Partial profile update; absent fields are left untouched by the backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<Address>,
}

// ============================================================================
// Lands
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaterAvailability {
    High,
    Medium,
    Low,
    Seasonal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LandStatus {
    Available,
    Rented,
    Maintenance,
}

/// Land listing as returned by `lands` and `lands/user/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Land {
    #[serde(rename = "_id")]
    pub id: String,
    pub owner_id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub location: Address,
    pub area: f64,
    pub price_per_acre: f64,
    pub soil_type: String,
    pub water_availability: WaterAvailability,
    pub status: LandStatus,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

/// Fields a landowner supplies when creating a listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewLand {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub location: Address,
    pub area: f64,
    pub price_per_acre: f64,
    pub soil_type: String,
    pub water_availability: WaterAvailability,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LandUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_per_acre: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub soil_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub water_availability: Option<WaterAvailability>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<LandStatus>,
}

// ============================================================================
// Store
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProductCategory {
    Organic,
    Biological,
    Botanical,
    Chemical,
}

impl ProductCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Organic => "Organic",
            Self::Biological => "Biological",
            Self::Botanical => "Botanical",
            Self::Chemical => "Chemical",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "organic" => Some(Self::Organic),
            "biological" => Some(Self::Biological),
            "botanical" => Some(Self::Botanical),
            "chemical" => Some(Self::Chemical),
            _ => None,
        }
    }
}

/// Pest-control product from `store/products`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub category: ProductCategory,
    pub price: f64,
    #[serde(default)]
    pub stock_quantity: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<ProductCategory>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stock_quantity: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: String,
    pub quantity: u32,
    pub price_at_purchase: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Pending,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    #[serde(rename = "_id")]
    pub id: String,
    pub user_id: String,
    pub items: Vec<OrderItem>,
    pub total_amount: f64,
    pub status: OrderStatus,
    #[serde(default)]
    pub created_at: String,
}

/// Body of `POST store/orders`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewOrder {
    pub items: Vec<OrderItem>,
    pub total_amount: f64,
}

/// Error body the backend attaches to non-2xx responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub detail: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn product_reads_mongo_id() {
        let json = serde_json::json!({
            "_id": "p1",
            "name": "Neem Oil",
            "category": "Botanical",
            "price": 50.0,
            "stock_quantity": 4
        });
        let product: Product = serde_json::from_value(json).expect("product");
        assert_eq!(product.id, "p1");
        assert_eq!(product.category, ProductCategory::Botanical);
        assert_eq!(product.stock_quantity, 4);
        assert!(product.description.is_none());
    }

    #[test]
    fn role_uses_lowercase_wire_names() {
        let role: Role = serde_json::from_str("\"landowner\"").expect("role");
        assert_eq!(role, Role::Landowner);
        assert_eq!(serde_json::to_string(&Role::Farmer).unwrap(), "\"farmer\"");
    }

    #[test]
    fn land_update_omits_unset_fields() {
        let update = LandUpdate {
            price_per_acre: Some(120.0),
            ..Default::default()
        };
        let value = serde_json::to_value(&update).expect("json");
        assert_eq!(value, serde_json::json!({ "price_per_acre": 120.0 }));
    }

    #[test]
    fn category_parse_is_case_insensitive() {
        assert_eq!(ProductCategory::parse("organic"), Some(ProductCategory::Organic));
        assert_eq!(ProductCategory::parse("CHEMICAL"), Some(ProductCategory::Chemical));
        assert_eq!(ProductCategory::parse("mineral"), None);
    }
}
