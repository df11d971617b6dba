use rust_decimal::Decimal;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{instrument, warn};

use crate::deadline::Deadline;
use crate::errors::ServiceError;
use crate::models::{CheckoutItem, ValidatedLineItem};
use crate::services::product_catalog::ProductCatalog;

/// Checks each cart line against the product service and swaps in the
/// authoritative price.
///
/// Rules, applied per item in cart order: the product must exist, appear once
/// in the cart, have a positive price and enough stock for the requested
/// quantity. The first violation rejects the whole cart. Stock is only read,
/// never reserved.
#[derive(Clone)]
pub struct ProductValidator {
    catalog: Arc<dyn ProductCatalog>,
}

impl ProductValidator {
    pub fn new(catalog: Arc<dyn ProductCatalog>) -> Self {
        Self { catalog }
    }

    #[instrument(skip(self, items, deadline), fields(items = items.len()))]
    pub async fn validate(
        &self,
        items: &[CheckoutItem],
        deadline: &Deadline,
    ) -> Result<Vec<ValidatedLineItem>, ServiceError> {
        let mut seen = HashSet::with_capacity(items.len());
        let mut validated = Vec::with_capacity(items.len());

        for item in items {
            let product = self
                .catalog
                .fetch_product(item.product_id, deadline)
                .await?
                .ok_or(ServiceError::ProductNotFound(item.product_id))?;

            if !seen.insert(item.product_id) {
                return Err(ServiceError::DuplicateProduct(item.product_id));
            }

            if product.price <= Decimal::ZERO {
                warn!(
                    product_id = item.product_id,
                    price = %product.price,
                    "Product service returned a non-positive price"
                );
                return Err(ServiceError::InvalidPrice {
                    product_id: item.product_id,
                    price: product.price,
                });
            }

            if item.quantity > product.stock {
                return Err(ServiceError::InsufficientStock {
                    product_id: item.product_id,
                    requested: item.quantity,
                    available: product.stock,
                });
            }

            validated.push(ValidatedLineItem {
                product_id: item.product_id,
                quantity: item.quantity,
                price: product.price,
            });
        }

        Ok(validated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Product;
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;
    use std::time::Duration;

    struct FixedCatalog(HashMap<i64, Product>);

    #[async_trait]
    impl ProductCatalog for FixedCatalog {
        async fn fetch_product(
            &self,
            product_id: i64,
            _deadline: &Deadline,
        ) -> Result<Option<Product>, ServiceError> {
            Ok(self.0.get(&product_id).cloned())
        }
    }

    struct DownCatalog;

    #[async_trait]
    impl ProductCatalog for DownCatalog {
        async fn fetch_product(
            &self,
            _product_id: i64,
            _deadline: &Deadline,
        ) -> Result<Option<Product>, ServiceError> {
            Err(ServiceError::ExternalServiceError("connection refused".into()))
        }
    }

    fn validator(products: &[(i64, Decimal, i64)]) -> ProductValidator {
        let map = products
            .iter()
            .map(|&(id, price, stock)| {
                (
                    id,
                    Product {
                        id,
                        name: None,
                        price,
                        stock,
                    },
                )
            })
            .collect();
        ProductValidator::new(Arc::new(FixedCatalog(map)))
    }

    fn item(product_id: i64, quantity: i64, price: Option<Decimal>) -> CheckoutItem {
        CheckoutItem {
            product_id,
            quantity,
            price,
        }
    }

    fn deadline() -> Deadline {
        Deadline::after(Duration::from_secs(1))
    }

    #[tokio::test]
    async fn replaces_client_price_with_catalog_price() {
        let v = validator(&[(42, dec!(10.0), 5)]);
        let items = v
            .validate(&[item(42, 2, Some(dec!(0.01)))], &deadline())
            .await
            .unwrap();
        assert_eq!(items[0].price, dec!(10.0));
        assert_eq!(items[0].quantity, 2);
    }

    #[tokio::test]
    async fn unknown_product_rejects_whole_cart() {
        let v = validator(&[(1, dec!(1), 10)]);
        let result = v
            .validate(&[item(1, 1, None), item(2, 1, None)], &deadline())
            .await;
        assert_matches!(result, Err(ServiceError::ProductNotFound(2)));
    }

    #[tokio::test]
    async fn duplicate_product_is_rejected() {
        let v = validator(&[(1, dec!(1), 10)]);
        let result = v
            .validate(&[item(1, 1, None), item(1, 2, None)], &deadline())
            .await;
        assert_matches!(result, Err(ServiceError::DuplicateProduct(1)));
    }

    #[tokio::test]
    async fn non_positive_price_is_rejected() {
        let v = validator(&[(3, dec!(0), 10)]);
        let result = v.validate(&[item(3, 1, None)], &deadline()).await;
        assert_matches!(result, Err(ServiceError::InvalidPrice { product_id: 3, .. }));
    }

    #[tokio::test]
    async fn quantity_above_stock_is_rejected() {
        let v = validator(&[(4, dec!(2), 1)]);
        let result = v.validate(&[item(4, 2, None)], &deadline()).await;
        assert_matches!(
            result,
            Err(ServiceError::InsufficientStock {
                product_id: 4,
                requested: 2,
                available: 1
            })
        );
    }

    #[tokio::test]
    async fn quantity_equal_to_stock_is_accepted() {
        let v = validator(&[(4, dec!(2), 2)]);
        assert!(v.validate(&[item(4, 2, None)], &deadline()).await.is_ok());
    }

    #[tokio::test]
    async fn catalog_failure_fails_closed() {
        let v = ProductValidator::new(Arc::new(DownCatalog));
        let result = v.validate(&[item(1, 1, None)], &deadline()).await;
        assert_matches!(result, Err(ServiceError::ExternalServiceError(_)));
    }
}
