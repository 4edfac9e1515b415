//! Cache key and tag definitions.
//!
//! `CacheKey` identifies one cached resource instance; `Tag` scopes
//! invalidation across entries.

use std::fmt;

use agromart_api_types::ProductCategory;

/// Server resource families the cache knows how to fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    /// Every land listing.
    Lands,
    /// Listings owned by one user.
    UserLands,
    /// Pest-control product catalog.
    Products,
    /// Orders of the authenticated user.
    UserOrders,
    /// Every order (landowner/admin view).
    AllOrders,
    /// One user's profile.
    Profile,
}

impl ResourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lands => "Lands",
            Self::UserLands => "UserLands",
            Self::Products => "Products",
            Self::UserOrders => "UserOrders",
            Self::AllOrders => "AllOrders",
            Self::Profile => "Profile",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters that, together with a [`ResourceKind`], select one resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QueryParams {
    None,
    User(String),
    ProductFilter { category: Option<ProductCategory> },
}

/// Deterministic identifier of a cached resource instance.
///
/// Two keys built from the same kind and parameters are equal and render the
/// same string, e.g. `Lands`, `UserLands(u1)` or `Products(category=Organic)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    kind: ResourceKind,
    params: QueryParams,
}

impl CacheKey {
    pub fn new(kind: ResourceKind, params: QueryParams) -> Self {
        Self { kind, params }
    }

    pub fn lands() -> Self {
        Self::new(ResourceKind::Lands, QueryParams::None)
    }

    pub fn user_lands(user_id: impl Into<String>) -> Self {
        Self::new(ResourceKind::UserLands, QueryParams::User(user_id.into()))
    }

    pub fn products(category: Option<ProductCategory>) -> Self {
        Self::new(
            ResourceKind::Products,
            QueryParams::ProductFilter { category },
        )
    }

    pub fn user_orders() -> Self {
        Self::new(ResourceKind::UserOrders, QueryParams::None)
    }

    pub fn all_orders() -> Self {
        Self::new(ResourceKind::AllOrders, QueryParams::None)
    }

    pub fn profile(user_id: impl Into<String>) -> Self {
        Self::new(ResourceKind::Profile, QueryParams::User(user_id.into()))
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn params(&self) -> &QueryParams {
        &self.params
    }

    /// The user identifier carried by user-scoped keys.
    pub fn user_id(&self) -> Option<&str> {
        match &self.params {
            QueryParams::User(id) => Some(id.as_str()),
            _ => None,
        }
    }

    pub fn category(&self) -> Option<ProductCategory> {
        match &self.params {
            QueryParams::ProductFilter { category } => *category,
            _ => None,
        }
    }

    /// Returns false when a required identifier is missing, in which case the
    /// query is skipped instead of fetched.
    pub fn is_complete(&self) -> bool {
        match (&self.kind, &self.params) {
            (ResourceKind::UserLands | ResourceKind::Profile, QueryParams::User(id)) => {
                !id.trim().is_empty()
            }
            (ResourceKind::UserLands | ResourceKind::Profile, _) => false,
            _ => true,
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.params {
            QueryParams::None => write!(f, "{}", self.kind),
            QueryParams::User(id) => write!(f, "{}({id})", self.kind),
            QueryParams::ProductFilter { category: None } => write!(f, "{}", self.kind),
            QueryParams::ProductFilter {
                category: Some(category),
            } => write!(f, "{}(category={})", self.kind, category.as_str()),
        }
    }
}

/// Tag families. Orders share one family across user and admin views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TagKind {
    Lands,
    UserLands,
    Products,
    Orders,
    Profile,
}

impl TagKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lands => "Lands",
            Self::UserLands => "UserLands",
            Self::Products => "Products",
            Self::Orders => "Orders",
            Self::Profile => "Profile",
        }
    }
}

/// Invalidation label attached to cache entries.
///
/// A tag without an id is coarse (`Products`); a tag with one is point-scoped
/// (`Products:p1`). Invalidating a coarse tag reaches every tag of its kind;
/// invalidating a scoped tag reaches only that exact tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tag {
    kind: TagKind,
    id: Option<String>,
}

impl Tag {
    pub fn coarse(kind: TagKind) -> Self {
        Self { kind, id: None }
    }

    pub fn scoped(kind: TagKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: Some(id.into()),
        }
    }

    pub fn kind(&self) -> TagKind {
        self.kind
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn is_coarse(&self) -> bool {
        self.id.is_none()
    }

    /// Whether invalidating `self` must also invalidate entries tagged `other`.
    pub fn covers(&self, other: &Tag) -> bool {
        self.kind == other.kind && (self.id.is_none() || self.id == other.id)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.id {
            Some(id) => write!(f, "{}:{id}", self.kind.as_str()),
            None => f.write_str(self.kind.as_str()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_render_deterministically() {
        assert_eq!(CacheKey::lands().to_string(), "Lands");
        assert_eq!(CacheKey::user_lands("u1").to_string(), "UserLands(u1)");
        assert_eq!(CacheKey::products(None).to_string(), "Products");
        assert_eq!(
            CacheKey::products(Some(ProductCategory::Organic)).to_string(),
            "Products(category=Organic)"
        );
        assert_eq!(CacheKey::user_lands("u1"), CacheKey::user_lands("u1"));
        assert_ne!(CacheKey::user_lands("u1"), CacheKey::profile("u1"));
    }

    #[test]
    fn user_scoped_keys_require_an_identifier() {
        assert!(CacheKey::user_lands("u1").is_complete());
        assert!(!CacheKey::user_lands("").is_complete());
        assert!(!CacheKey::profile("   ").is_complete());
        assert!(!CacheKey::new(ResourceKind::Profile, QueryParams::None).is_complete());
        assert!(CacheKey::all_orders().is_complete());
    }

    #[test]
    fn coarse_tag_covers_its_kind_only() {
        let coarse = Tag::coarse(TagKind::Lands);
        let scoped = Tag::scoped(TagKind::Lands, "l1");
        let other = Tag::scoped(TagKind::UserLands, "u1");

        assert!(coarse.covers(&coarse));
        assert!(coarse.covers(&scoped));
        assert!(!coarse.covers(&other));
        assert!(scoped.covers(&scoped));
        assert!(!scoped.covers(&coarse));
        assert!(!scoped.covers(&Tag::scoped(TagKind::Lands, "l2")));
    }

    #[test]
    fn tags_display_with_optional_id() {
        assert_eq!(Tag::coarse(TagKind::Orders).to_string(), "Orders");
        assert_eq!(
            Tag::scoped(TagKind::Profile, "u9").to_string(),
            "Profile:u9"
        );
    }
}
