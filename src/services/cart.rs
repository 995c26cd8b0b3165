use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    config::AppConfig,
    db::DbPool,
    entities::{
        address, cart, cart_item, Address, AddressModel, Cart, CartItem, CartItemModel, CartModel,
        Product, ProductModel, Voucher,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        coin_ledger,
        pricing::{self, PricedLine, VoucherTerms},
        shipping::ServiceOption,
        vouchers::VoucherService,
    },
};

/// Shopping cart store. One active cart per buyer; every entry point
/// recomputes and persists the cart's totals through the pricing engine
/// before returning, so callers never observe stale money.
#[derive(Clone)]
pub struct CartService {
    db: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    config: Arc<AppConfig>,
}

/// A cart item joined with its product.
#[derive(Debug, Clone, Serialize)]
pub struct CartItemDetail {
    pub item: CartItemModel,
    pub product: ProductModel,
    pub subtotal: Decimal,
}

/// Cart with items, products, and the selected address resolved.
#[derive(Debug, Clone, Serialize)]
pub struct CartDetail {
    pub cart: CartModel,
    pub items: Vec<CartItemDetail>,
    pub address: Option<AddressModel>,
}

/// Route and weight inputs for a shipping quote, with the preconditions
/// already enforced.
#[derive(Debug, Clone)]
pub struct ShippingContext {
    pub origin: String,
    pub destination: String,
    pub weight_grams: i64,
}

#[derive(Debug, Deserialize)]
pub struct VariationChoice {
    pub label: String,
    pub value: String,
}

#[derive(Debug, Deserialize)]
pub struct AddItemInput {
    pub product_id: Uuid,
    pub quantity: i32,
    pub note: Option<String>,
    pub variations: Option<Vec<VariationChoice>>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateItemInput {
    pub quantity: i32,
    pub note: Option<String>,
    pub variations: Option<Vec<VariationChoice>>,
}

impl CartService {
    pub fn new(db: Arc<DbPool>, event_sender: Arc<EventSender>, config: Arc<AppConfig>) -> Self {
        Self {
            db,
            event_sender,
            config,
        }
    }

    fn service_fee(&self) -> Decimal {
        Decimal::from_f64_retain(self.config.service_fee).unwrap_or(Decimal::ZERO)
    }

    /// Returns the buyer's cart, creating it lazily on first access with the
    /// buyer's default address when one exists. Totals are recomputed before
    /// the cart is returned.
    #[instrument(skip(self))]
    pub async fn get_or_create(&self, buyer_id: Uuid) -> Result<CartModel, ServiceError> {
        let existing = Cart::find()
            .filter(cart::Column::BuyerId.eq(buyer_id))
            .one(&*self.db)
            .await?;

        let cart = match existing {
            Some(cart) => cart,
            None => {
                let default_address = Address::find()
                    .filter(address::Column::UserId.eq(buyer_id))
                    .filter(address::Column::IsDefault.eq(true))
                    .one(&*self.db)
                    .await?;

                let cart_id = Uuid::new_v4();
                let cart = cart::ActiveModel {
                    id: Set(cart_id),
                    buyer_id: Set(buyer_id),
                    address_id: Set(default_address.map(|a| a.id)),
                    courier: Set(None),
                    courier_service: Set(None),
                    courier_eta: Set(None),
                    courier_price: Set(Decimal::ZERO),
                    voucher_id: Set(None),
                    voucher_discount: Set(Decimal::ZERO),
                    voucher_cashback: Set(Decimal::ZERO),
                    service_fee: Set(self.service_fee()),
                    use_coin: Set(false),
                    coin_applied: Set(Decimal::ZERO),
                    total: Set(Decimal::ZERO),
                    total_payment: Set(Decimal::ZERO),
                    payment_method: Set(None),
                    created_at: Set(Utc::now()),
                    updated_at: Set(Utc::now()),
                }
                .insert(&*self.db)
                .await?;

                self.event_sender.send_or_log(Event::CartCreated(cart_id)).await;
                info!(%buyer_id, %cart_id, "created cart");
                cart
            }
        };

        self.recompute(&*self.db, cart).await
    }

    /// The buyer's cart with items, products, and address resolved.
    pub async fn detail(&self, buyer_id: Uuid) -> Result<CartDetail, ServiceError> {
        let cart = self.get_or_create(buyer_id).await?;
        self.detail_for(&*self.db, cart).await
    }

    async fn detail_for(
        &self,
        conn: &impl ConnectionTrait,
        cart: CartModel,
    ) -> Result<CartDetail, ServiceError> {
        let items = Self::items_with_products(conn, cart.id).await?;
        let address = match cart.address_id {
            Some(address_id) => Address::find_by_id(address_id).one(conn).await?,
            None => None,
        };

        let items = items
            .into_iter()
            .map(|(item, product)| {
                let subtotal = product.unit_price() * Decimal::from(item.quantity);
                CartItemDetail {
                    item,
                    product,
                    subtotal,
                }
            })
            .collect();

        Ok(CartDetail {
            cart,
            items,
            address,
        })
    }

    /// Adds an item. Rejects quantities beyond the product's current stock
    /// and products from a different seller than the cart's existing items.
    #[instrument(skip(self, input))]
    pub async fn add_item(
        &self,
        buyer_id: Uuid,
        input: AddItemInput,
    ) -> Result<CartDetail, ServiceError> {
        if input.quantity < 1 {
            return Err(ServiceError::ValidationError(
                "quantity must be at least 1".to_string(),
            ));
        }

        let cart = self.get_or_create(buyer_id).await?;
        let txn = self.db.begin().await?;

        let product = Product::find_by_id(input.product_id)
            .one(&txn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Product {} not found", input.product_id))
            })?;

        if product.stock < input.quantity {
            return Err(ServiceError::InsufficientStock(format!(
                "only {} left in stock",
                product.stock
            )));
        }

        // A cart may not mix sellers.
        if let Some(cart_seller) = Self::cart_seller_id(&txn, cart.id).await? {
            if cart_seller != product.seller_id {
                return Err(ServiceError::SellerMismatch);
            }
        }

        let item_id = Uuid::new_v4();
        cart_item::ActiveModel {
            id: Set(item_id),
            cart_id: Set(cart.id),
            product_id: Set(product.id),
            variations: Set(encode_variations(input.variations)?),
            quantity: Set(input.quantity),
            note: Set(input.note),
            created_at: Set(Utc::now()),
            updated_at: Set(Utc::now()),
        }
        .insert(&txn)
        .await?;

        let cart = self.recompute(&txn, cart).await?;
        let detail = self.detail_for(&txn, cart).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartItemAdded {
                cart_id: detail.cart.id,
                product_id: product.id,
            })
            .await;

        info!(%buyer_id, product_id = %product.id, qty = input.quantity, "added item to cart");
        Ok(detail)
    }

    /// Updates an item's quantity, note, or variation choices.
    #[instrument(skip(self, input))]
    pub async fn update_item(
        &self,
        buyer_id: Uuid,
        item_id: Uuid,
        input: UpdateItemInput,
    ) -> Result<CartDetail, ServiceError> {
        if input.quantity < 1 {
            return Err(ServiceError::ValidationError(
                "quantity must be at least 1".to_string(),
            ));
        }

        let cart = self.get_or_create(buyer_id).await?;
        let txn = self.db.begin().await?;

        let item = Self::owned_item(&txn, cart.id, item_id).await?;

        let product = Product::find_by_id(item.product_id)
            .one(&txn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Product {} not found", item.product_id))
            })?;

        if product.stock < input.quantity {
            return Err(ServiceError::InsufficientStock(format!(
                "only {} left in stock",
                product.stock
            )));
        }

        let mut item: cart_item::ActiveModel = item.into();
        item.quantity = Set(input.quantity);
        item.note = Set(input.note);
        item.variations = Set(encode_variations(input.variations)?);
        item.updated_at = Set(Utc::now());
        item.update(&txn).await?;

        let cart = self.recompute(&txn, cart).await?;
        let detail = self.detail_for(&txn, cart).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartItemUpdated {
                cart_id: detail.cart.id,
                item_id,
            })
            .await;

        Ok(detail)
    }

    /// Removes a single item from the cart.
    #[instrument(skip(self))]
    pub async fn remove_item(
        &self,
        buyer_id: Uuid,
        item_id: Uuid,
    ) -> Result<CartDetail, ServiceError> {
        let cart = self.get_or_create(buyer_id).await?;
        let txn = self.db.begin().await?;

        let item = Self::owned_item(&txn, cart.id, item_id).await?;
        CartItem::delete_by_id(item.id).exec(&txn).await?;

        let cart = self.recompute(&txn, cart).await?;
        let detail = self.detail_for(&txn, cart).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartItemRemoved {
                cart_id: detail.cart.id,
                item_id,
            })
            .await;

        Ok(detail)
    }

    /// Selects one of the buyer's own addresses as the delivery address.
    #[instrument(skip(self))]
    pub async fn set_address(
        &self,
        buyer_id: Uuid,
        address_id: Uuid,
    ) -> Result<CartDetail, ServiceError> {
        let cart = self.get_or_create(buyer_id).await?;

        let address = Address::find_by_id(address_id)
            .filter(address::Column::UserId.eq(buyer_id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Address {} not found", address_id)))?;

        let mut active: cart::ActiveModel = cart.into();
        active.address_id = Set(Some(address.id));
        active.updated_at = Set(Utc::now());
        let cart = active.update(&*self.db).await?;

        let cart = self.recompute(&*self.db, cart).await?;
        self.detail_for(&*self.db, cart).await
    }

    /// Attaches a voucher after checking its window and seller scope.
    #[instrument(skip(self))]
    pub async fn apply_voucher(
        &self,
        buyer_id: Uuid,
        code: &str,
    ) -> Result<CartDetail, ServiceError> {
        let cart = self.get_or_create(buyer_id).await?;

        let voucher = Voucher::find()
            .filter(crate::entities::voucher::Column::Code.eq(code))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Voucher {} not found", code)))?;

        let cart_seller = Self::cart_seller_id(&*self.db, cart.id).await?;
        VoucherService::ensure_eligible(&voucher, cart_seller, Utc::now())?;

        let mut active: cart::ActiveModel = cart.into();
        active.voucher_id = Set(Some(voucher.id));
        active.updated_at = Set(Utc::now());
        let cart = active.update(&*self.db).await?;

        let cart = self.recompute(&*self.db, cart).await?;
        self.event_sender
            .send_or_log(Event::VoucherApplied {
                cart_id: cart.id,
                voucher_id: voucher.id,
            })
            .await;

        self.detail_for(&*self.db, cart).await
    }

    /// Detaches the voucher and zeroes its computed amounts.
    #[instrument(skip(self))]
    pub async fn remove_voucher(&self, buyer_id: Uuid) -> Result<CartDetail, ServiceError> {
        let cart = self.get_or_create(buyer_id).await?;

        let cart_id = cart.id;
        let mut active: cart::ActiveModel = cart.into();
        active.voucher_id = Set(None);
        active.updated_at = Set(Utc::now());
        let cart = active.update(&*self.db).await?;

        let cart = self.recompute(&*self.db, cart).await?;
        self.event_sender.send_or_log(Event::VoucherRemoved(cart_id)).await;

        self.detail_for(&*self.db, cart).await
    }

    /// Locks in a quoted shipping service for the cart.
    #[instrument(skip(self, option))]
    pub async fn set_shipping(
        &self,
        buyer_id: Uuid,
        courier: &str,
        option: &ServiceOption,
    ) -> Result<CartDetail, ServiceError> {
        let cart = self.get_or_create(buyer_id).await?;

        let mut active: cart::ActiveModel = cart.into();
        active.courier = Set(Some(courier.to_string()));
        active.courier_service = Set(Some(option.service.clone()));
        active.courier_eta = Set(Some(option.eta.clone()));
        active.courier_price = Set(option.price);
        active.updated_at = Set(Utc::now());
        let cart = active.update(&*self.db).await?;

        let cart = self.recompute(&*self.db, cart).await?;
        self.event_sender
            .send_or_log(Event::ShippingSelected {
                cart_id: cart.id,
                courier: courier.to_string(),
            })
            .await;

        self.detail_for(&*self.db, cart).await
    }

    /// Records whether the buyer wants to spend coin on this cart. The
    /// applied amount itself is derived on every recompute from the live
    /// balance and the subtotal share cap.
    #[instrument(skip(self))]
    pub async fn toggle_coin(
        &self,
        buyer_id: Uuid,
        use_coin: bool,
    ) -> Result<CartDetail, ServiceError> {
        let cart = self.get_or_create(buyer_id).await?;

        let mut active: cart::ActiveModel = cart.into();
        active.use_coin = Set(use_coin);
        active.updated_at = Set(Utc::now());
        let cart = active.update(&*self.db).await?;

        let cart = self.recompute(&*self.db, cart).await?;
        self.detail_for(&*self.db, cart).await
    }

    /// Validates the shipping preconditions and returns the route inputs:
    /// a non-empty cart, a seller pickup address, and a cart address, each
    /// with an area code.
    pub async fn shipping_context(&self, buyer_id: Uuid) -> Result<ShippingContext, ServiceError> {
        let cart = self.get_or_create(buyer_id).await?;
        let items = Self::items_with_products(&*self.db, cart.id).await?;

        if items.is_empty() {
            return Err(ServiceError::EmptyCart);
        }

        let seller_id = items[0].1.seller_id;
        let seller_address = Address::find()
            .filter(address::Column::UserId.eq(seller_id))
            .filter(address::Column::IsDefault.eq(true))
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::ValidationError("seller has not set a pickup address".to_string())
            })?;

        let cart_address_id = cart.address_id.ok_or_else(|| {
            ServiceError::ValidationError("delivery address has not been set".to_string())
        })?;
        let cart_address = Address::find_by_id(cart_address_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::ValidationError("delivery address has not been set".to_string())
            })?;

        let weight_grams: i64 = items
            .iter()
            .map(|(item, product)| i64::from(item.quantity) * i64::from(product.weight_grams))
            .sum();

        Ok(ShippingContext {
            origin: seller_address.area_code,
            destination: cart_address.area_code,
            weight_grams,
        })
    }

    /// The seller whose items the cart currently holds, if any.
    pub async fn cart_seller_id(
        conn: &impl ConnectionTrait,
        cart_id: Uuid,
    ) -> Result<Option<Uuid>, ServiceError> {
        let first = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart_id))
            .order_by_asc(cart_item::Column::CreatedAt)
            .find_also_related(Product)
            .one(conn)
            .await?;

        Ok(first.and_then(|(_, product)| product.map(|p| p.seller_id)))
    }

    /// Loads the cart's items joined with their products.
    pub async fn items_with_products(
        conn: &impl ConnectionTrait,
        cart_id: Uuid,
    ) -> Result<Vec<(CartItemModel, ProductModel)>, ServiceError> {
        let rows = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart_id))
            .order_by_asc(cart_item::Column::CreatedAt)
            .find_also_related(Product)
            .all(conn)
            .await?;

        rows.into_iter()
            .map(|(item, product)| {
                let product = product.ok_or_else(|| {
                    ServiceError::NotFound(format!("Product {} not found", item.product_id))
                })?;
                Ok((item, product))
            })
            .collect()
    }

    async fn owned_item(
        conn: &impl ConnectionTrait,
        cart_id: Uuid,
        item_id: Uuid,
    ) -> Result<CartItemModel, ServiceError> {
        CartItem::find_by_id(item_id)
            .filter(cart_item::Column::CartId.eq(cart_id))
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Cart item {} not found", item_id)))
    }

    /// Recomputes the cart's totals through the pricing engine and persists
    /// them. Voucher amounts and the applied coin are all re-derived; the
    /// stored values are only ever the output of this step.
    pub async fn recompute(
        &self,
        conn: &impl ConnectionTrait,
        cart: CartModel,
    ) -> Result<CartModel, ServiceError> {
        let items = Self::items_with_products(conn, cart.id).await?;

        let lines: Vec<PricedLine> = items
            .iter()
            .map(|(item, product)| PricedLine {
                quantity: item.quantity,
                unit_price: product.unit_price(),
            })
            .collect();

        let voucher = match cart.voucher_id {
            Some(voucher_id) => Voucher::find_by_id(voucher_id).one(conn).await?,
            None => None,
        };
        let voucher_terms = voucher.as_ref().map(VoucherTerms::from);

        let balance = if cart.use_coin {
            coin_ledger::balance(conn, cart.buyer_id).await?
        } else {
            Decimal::ZERO
        };

        let totals = pricing::compute_totals(
            &lines,
            cart.courier_price,
            cart.service_fee,
            voucher_terms.as_ref(),
            cart.use_coin,
            balance,
        );

        let mut active: cart::ActiveModel = cart.into();
        active.voucher_discount = Set(totals.voucher_discount);
        active.voucher_cashback = Set(totals.voucher_cashback);
        active.coin_applied = Set(totals.coin_applied);
        active.total = Set(totals.total);
        active.total_payment = Set(totals.total_payment);
        active.updated_at = Set(Utc::now());

        Ok(active.update(conn).await?)
    }
}

fn encode_variations(
    variations: Option<Vec<VariationChoice>>,
) -> Result<Option<serde_json::Value>, ServiceError> {
    match variations {
        None => Ok(None),
        Some(choices) => {
            let entries: Vec<serde_json::Value> = choices
                .into_iter()
                .map(|c| serde_json::json!({ "label": c.label, "value": c.value }))
                .collect();
            Ok(Some(serde_json::Value::Array(entries)))
        }
    }
}
