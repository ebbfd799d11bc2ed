use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use invoicekit_core::{Aggregate, AggregateId, AggregateRoot, DomainError, Money, TenantId};
use invoicekit_events::Event;

/// Product identifier (tenant-scoped via `tenant_id` fields in events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(pub AggregateId);

impl ProductId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for ProductId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Product status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductStatus {
    Active,
    Archived,
}

/// Catalog entry fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductDetails {
    pub name: String,
    pub description: Option<String>,
    /// Unit of measure shown next to quantities ("hour", "kg", "pcs").
    pub unit: Option<String>,
    /// Price in smallest currency unit (e.g., cents).
    pub default_price: Money,
}

impl ProductDetails {
    fn normalized(&self) -> Self {
        fn opt(v: &Option<String>) -> Option<String> {
            v.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        }

        Self {
            name: self.name.trim().to_string(),
            description: opt(&self.description),
            unit: opt(&self.unit),
            default_price: self.default_price,
        }
    }

    fn validate(&self) -> Result<(), DomainError> {
        if self.name.is_empty() {
            return Err(DomainError::validation("product name cannot be empty"));
        }
        self.default_price.ensure_non_negative("default_price")?;
        Ok(())
    }
}

/// Aggregate root: Product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Product {
    id: ProductId,
    tenant_id: Option<TenantId>,
    details: ProductDetails,
    status: ProductStatus,
    version: u64,
    created: bool,
}

impl Product {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: ProductId) -> Self {
        Self {
            id,
            tenant_id: None,
            details: ProductDetails::default(),
            status: ProductStatus::Active,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> ProductId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn details(&self) -> &ProductDetails {
        &self.details
    }

    pub fn default_price(&self) -> Money {
        self.details.default_price
    }

    pub fn status(&self) -> ProductStatus {
        self.status
    }

    /// Only active products are offered when building new line items.
    pub fn can_be_sold(&self) -> bool {
        self.created && self.status == ProductStatus::Active
    }
}

impl AggregateRoot for Product {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateProduct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateProduct {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub details: ProductDetails,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateProduct (full replacement of the details).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateProduct {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub details: ProductDetails,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ArchiveProduct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveProduct {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductCommand {
    CreateProduct(CreateProduct),
    UpdateProduct(UpdateProduct),
    ArchiveProduct(ArchiveProduct),
}

/// Event: ProductCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductCreated {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub details: ProductDetails,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ProductUpdated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductUpdated {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub details: ProductDetails,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ProductArchived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductArchived {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductEvent {
    ProductCreated(ProductCreated),
    ProductUpdated(ProductUpdated),
    ProductArchived(ProductArchived),
}

impl ProductEvent {
    pub fn tenant_id(&self) -> TenantId {
        match self {
            ProductEvent::ProductCreated(e) => e.tenant_id,
            ProductEvent::ProductUpdated(e) => e.tenant_id,
            ProductEvent::ProductArchived(e) => e.tenant_id,
        }
    }

    pub fn product_id(&self) -> ProductId {
        match self {
            ProductEvent::ProductCreated(e) => e.product_id,
            ProductEvent::ProductUpdated(e) => e.product_id,
            ProductEvent::ProductArchived(e) => e.product_id,
        }
    }
}

impl Event for ProductEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ProductEvent::ProductCreated(_) => "products.product.created",
            ProductEvent::ProductUpdated(_) => "products.product.updated",
            ProductEvent::ProductArchived(_) => "products.product.archived",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ProductEvent::ProductCreated(e) => e.occurred_at,
            ProductEvent::ProductUpdated(e) => e.occurred_at,
            ProductEvent::ProductArchived(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Product {
    type Command = ProductCommand;
    type Event = ProductEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ProductEvent::ProductCreated(e) => {
                self.id = e.product_id;
                self.tenant_id = Some(e.tenant_id);
                self.details = e.details.clone();
                self.status = ProductStatus::Active;
                self.created = true;
            }
            ProductEvent::ProductUpdated(e) => {
                self.details = e.details.clone();
            }
            ProductEvent::ProductArchived(_) => {
                self.status = ProductStatus::Archived;
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ProductCommand::CreateProduct(cmd) => self.handle_create(cmd),
            ProductCommand::UpdateProduct(cmd) => self.handle_update(cmd),
            ProductCommand::ArchiveProduct(cmd) => self.handle_archive(cmd),
        }
    }
}

impl Product {
    fn ensure_tenant(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if !self.created {
            return Ok(());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        Ok(())
    }

    fn ensure_product_id(&self, product_id: ProductId) -> Result<(), DomainError> {
        if self.id != product_id {
            return Err(DomainError::invariant("product_id mismatch"));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateProduct) -> Result<Vec<ProductEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("product already exists"));
        }

        let details = cmd.details.normalized();
        details.validate()?;

        Ok(vec![ProductEvent::ProductCreated(ProductCreated {
            tenant_id: cmd.tenant_id,
            product_id: cmd.product_id,
            details,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdateProduct) -> Result<Vec<ProductEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_product_id(cmd.product_id)?;

        if self.status == ProductStatus::Archived {
            return Err(DomainError::invariant("archived products cannot be updated"));
        }

        let details = cmd.details.normalized();
        details.validate()?;

        Ok(vec![ProductEvent::ProductUpdated(ProductUpdated {
            tenant_id: cmd.tenant_id,
            product_id: cmd.product_id,
            details,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_archive(&self, cmd: &ArchiveProduct) -> Result<Vec<ProductEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_product_id(cmd.product_id)?;

        if self.status == ProductStatus::Archived {
            return Err(DomainError::conflict("product is already archived"));
        }

        Ok(vec![ProductEvent::ProductArchived(ProductArchived {
            tenant_id: cmd.tenant_id,
            product_id: cmd.product_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_tenant_id() -> TenantId {
        TenantId::new()
    }

    fn test_product_id() -> ProductId {
        ProductId::new(AggregateId::new())
    }

    fn consulting(price: i64) -> ProductDetails {
        ProductDetails {
            name: "Consulting".to_string(),
            description: Some("  ".to_string()),
            unit: Some("hour".to_string()),
            default_price: Money::from_minor(price),
        }
    }

    #[test]
    fn create_product_emits_product_created_event() {
        let product = Product::empty(test_product_id());
        let tenant_id = test_tenant_id();
        let product_id = test_product_id();

        let events = product
            .handle(&ProductCommand::CreateProduct(CreateProduct {
                tenant_id,
                product_id,
                details: consulting(5_000),
                occurred_at: Utc::now(),
            }))
            .unwrap();
        assert_eq!(events.len(), 1);

        match &events[0] {
            ProductEvent::ProductCreated(e) => {
                assert_eq!(e.tenant_id, tenant_id);
                assert_eq!(e.product_id, product_id);
                assert_eq!(e.details.name, "Consulting");
                assert_eq!(e.details.description, None);
                assert_eq!(e.details.default_price, Money::from_minor(5_000));
            }
            _ => panic!("Expected ProductCreated event"),
        }
    }

    #[test]
    fn create_product_rejects_negative_price() {
        let err = Product::empty(test_product_id())
            .handle(&ProductCommand::CreateProduct(CreateProduct {
                tenant_id: test_tenant_id(),
                product_id: test_product_id(),
                details: consulting(-1),
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidAmount(_)));
    }

    #[test]
    fn create_product_rejects_empty_name() {
        let mut details = consulting(100);
        details.name = "  ".to_string();
        let err = Product::empty(test_product_id())
            .handle(&ProductCommand::CreateProduct(CreateProduct {
                tenant_id: test_tenant_id(),
                product_id: test_product_id(),
                details,
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn archived_product_cannot_be_updated() {
        let tenant_id = test_tenant_id();
        let product_id = test_product_id();
        let mut product = Product::empty(product_id);

        for cmd in [
            ProductCommand::CreateProduct(CreateProduct {
                tenant_id,
                product_id,
                details: consulting(100),
                occurred_at: Utc::now(),
            }),
            ProductCommand::ArchiveProduct(ArchiveProduct {
                tenant_id,
                product_id,
                occurred_at: Utc::now(),
            }),
        ] {
            let events = product.handle(&cmd).unwrap();
            product.apply(&events[0]);
        }
        assert!(!product.can_be_sold());
        assert_eq!(product.version(), 2);

        let err = product
            .handle(&ProductCommand::UpdateProduct(UpdateProduct {
                tenant_id,
                product_id,
                details: consulting(200),
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn update_on_missing_product_is_not_found() {
        let product_id = test_product_id();
        let err = Product::empty(product_id)
            .handle(&ProductCommand::UpdateProduct(UpdateProduct {
                tenant_id: test_tenant_id(),
                product_id,
                details: consulting(200),
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert_eq!(err, DomainError::NotFound);
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 256,
                ..ProptestConfig::default()
            })]

            /// Handle never mutates state and returns the same events for the same input.
            #[test]
            fn handle_is_deterministic(
                name in "[A-Za-z][A-Za-z0-9 ]{0,60}",
                price in 0i64..10_000_000
            ) {
                let product = Product::empty(test_product_id());
                let cmd = ProductCommand::CreateProduct(CreateProduct {
                    tenant_id: test_tenant_id(),
                    product_id: test_product_id(),
                    details: ProductDetails {
                        name,
                        description: None,
                        unit: None,
                        default_price: Money::from_minor(price),
                    },
                    occurred_at: Utc::now(),
                });

                let before = product.clone();
                let first = product.handle(&cmd);
                let second = product.handle(&cmd);

                prop_assert_eq!(&before, &product);
                prop_assert_eq!(first, second);
            }
        }
    }
}
