use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, instrument, warn};

use super::{checkout_service::line_total, CartLock};
use crate::{
    auth::AuthUser,
    entities::commerce::{CartModel, ProductModel, MAX_LINE_QUANTITY},
    errors::ServiceError,
    repositories::{
        CartFilter, CartRepository, NewCartItem, ProductFilter, ProductRepository,
    },
};

/// A cart line together with its product and the price it would cost today.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartLine {
    #[serde(flatten)]
    pub cart: CartModel,
    pub product: ProductModel,
    pub total_price_now: i64,
}

/// Shopping cart operations on the caller's open (`in_cart`) lines. Edits
/// hold the same per-user lock as checkout and get `Conflict` while one runs.
#[derive(Clone)]
pub struct CartService {
    carts: Arc<dyn CartRepository>,
    products: Arc<dyn ProductRepository>,
    cart_lock: CartLock,
}

impl CartService {
    pub fn new(
        carts: Arc<dyn CartRepository>,
        products: Arc<dyn ProductRepository>,
        cart_lock: CartLock,
    ) -> Self {
        Self {
            carts,
            products,
            cart_lock,
        }
    }

    /// Adds `quantity` of a product. An existing open line for the same
    /// product absorbs the quantity instead of creating a second line.
    #[instrument(skip(self, caller), fields(user_id = caller.user_id))]
    pub async fn add_item(
        &self,
        caller: &AuthUser,
        product_id: i32,
        quantity: i32,
    ) -> Result<CartModel, ServiceError> {
        if !(1..=MAX_LINE_QUANTITY).contains(&quantity) {
            return Err(ServiceError::ValidationError(format!(
                "quantity must be between 1 and {MAX_LINE_QUANTITY}"
            )));
        }

        self.products.get(ProductFilter::by_id(product_id)).await?;

        let line = self
            .cart_lock
            .run(caller.user_id, || {
                self.carts.create(NewCartItem {
                    user_id: caller.user_id,
                    product_id,
                    quantity,
                })
            })
            .await?;

        info!(cart_id = line.id, quantity = line.quantity, "Cart line updated");
        Ok(line)
    }

    #[instrument(skip(self, caller), fields(user_id = caller.user_id))]
    pub async fn list_items(&self, caller: &AuthUser) -> Result<Vec<CartLine>, ServiceError> {
        let carts = self
            .carts
            .get_list(CartFilter::open_for_user(caller.user_id))
            .await?;
        if carts.is_empty() {
            return Ok(Vec::new());
        }

        let ids = carts.iter().map(|c| c.product_id).collect();
        let products: HashMap<i32, ProductModel> = self
            .products
            .get_list_by_ids(ids)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        let lines = carts
            .into_iter()
            .filter_map(|cart| match products.get(&cart.product_id) {
                Some(product) => Some(CartLine {
                    total_price_now: line_total(cart.quantity, product.price).unwrap_or(i64::MAX),
                    product: product.clone(),
                    cart,
                }),
                None => {
                    warn!(cart_id = cart.id, product_id = cart.product_id, "Cart line references a missing product");
                    None
                }
            })
            .collect();

        Ok(lines)
    }

    /// Deletes one of the caller's open lines.
    #[instrument(skip(self, caller), fields(user_id = caller.user_id))]
    pub async fn remove_item(&self, caller: &AuthUser, cart_id: i32) -> Result<(), ServiceError> {
        let removed = self
            .cart_lock
            .run(caller.user_id, || {
                self.carts.delete(CartFilter {
                    id: Some(cart_id),
                    ..CartFilter::open_for_user(caller.user_id)
                })
            })
            .await?;

        if removed == 0 {
            return Err(ServiceError::NotFound(format!("cart item {cart_id}")));
        }
        info!(cart_id, "Cart line removed");
        Ok(())
    }
}
