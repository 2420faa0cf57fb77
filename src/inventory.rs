//! The inventory schema: items, customers, orders and order lines.
//!
//! Root fields read the store directly. Every reference from one entity to
//! another goes through a named request-scoped loader, so a query touching N
//! orders fetches their customers with a single bulk call.

use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;

use crate::context::Ctx;
use crate::error::{ResolveError, SchemaError};
use crate::loader::{BatchResult, BoxFuture};
use crate::model::{
    Customer, CustomerInput, Item, ItemInput, Order, OrderInput, OrderItem, OrderItemInput,
};
use crate::schema::{
    FieldDefinition, InputObjectType, InputValue, ObjectType, Resolution, Schema, TypeRef, FLOAT,
    INT, STRING,
};
use crate::store::{Store, StoreResult};
use crate::value::{FromConstValue, ToConstValue};

pub const ORDERS_BY_CUSTOMER_ID: &str = "orders-by-customer-id";
pub const CUSTOMERS_BY_ID: &str = "customers-by-id";
pub const ORDER_ITEMS_BY_ORDER_ID: &str = "order-items-by-order-id";
pub const ITEMS_BY_BARCODE: &str = "items-by-barcode";
pub const ORDERS_BY_ID: &str = "orders-by-id";

pub fn inventory_schema(store: Arc<dyn Store>) -> Result<Schema, SchemaError> {
    Schema::build("Query", Some("Mutation"))
        .register(query_type(&store))
        .register(mutation_type(&store))
        .register(item_type())
        .register(customer_type(&store))
        .register(order_type(&store))
        .register(order_item_type(&store))
        .register_input(
            InputObjectType::new("ItemInput")
                .field(InputValue::new("barcode", TypeRef::named_nn(STRING)))
                .field(InputValue::new("title", TypeRef::named_nn(STRING)))
                .field(InputValue::new("sellingPrice", TypeRef::named_nn(FLOAT))),
        )
        .register_input(
            InputObjectType::new("CustomerInput")
                .field(InputValue::new("name", TypeRef::named_nn(STRING)))
                .field(InputValue::new("billingAddress", TypeRef::named_nn(STRING))),
        )
        .register_input(
            InputObjectType::new("OrderInput")
                .field(InputValue::new("tag", TypeRef::named_nn(STRING)))
                .field(InputValue::new("createdAt", TypeRef::named_nn(STRING)))
                .field(InputValue::new("customerId", TypeRef::named_nn(INT))),
        )
        .register_input(
            InputObjectType::new("OrderItemInput")
                .field(InputValue::new("barcode", TypeRef::named_nn(STRING)))
                .field(InputValue::new("quantity", TypeRef::named_nn(INT)))
                .field(InputValue::new("orderId", TypeRef::named_nn(INT))),
        )
        .finish()
}

fn query_type(store: &Arc<dyn Store>) -> ObjectType {
    ObjectType::new("Query")
        .field(
            FieldDefinition::new("item", TypeRef::named("Item"), {
                let store = store.clone();
                move |ctx: &Ctx<'_>| {
                    with_arg(ctx, "barcode", |barcode: String| {
                        from_store(&store, |store| async move {
                            store.item_by_barcode(barcode).await
                        })
                    })
                }
            })
            .argument(InputValue::new("barcode", TypeRef::named_nn(STRING))),
        )
        .field(FieldDefinition::new("items", TypeRef::named_list("Item"), {
            let store = store.clone();
            move |_ctx: &Ctx<'_>| from_store(&store, |store| async move { store.items().await })
        }))
        .field(FieldDefinition::new("orders", TypeRef::named_list("Order"), {
            let store = store.clone();
            move |_ctx: &Ctx<'_>| from_store(&store, |store| async move { store.orders().await })
        }))
        .field(FieldDefinition::new(
            "customers",
            TypeRef::named_list("Customer"),
            {
                let store = store.clone();
                move |_ctx: &Ctx<'_>| from_store(&store, |store| async move { store.customers().await })
            },
        ))
        .field(
            FieldDefinition::new("order", TypeRef::named("Order"), {
                let store = store.clone();
                move |ctx: &Ctx<'_>| {
                    with_arg(ctx, "id", |id: i64| {
                        from_store(&store, |store| async move { store.order_by_id(id).await })
                    })
                }
            })
            .argument(InputValue::new("id", TypeRef::named_nn(INT))),
        )
        .field(
            FieldDefinition::new("customer", TypeRef::named("Customer"), {
                let store = store.clone();
                move |ctx: &Ctx<'_>| {
                    with_arg(ctx, "id", |id: i64| {
                        from_store(&store, |store| async move { store.customer_by_id(id).await })
                    })
                }
            })
            .argument(InputValue::new("id", TypeRef::named_nn(INT))),
        )
}

fn mutation_type(store: &Arc<dyn Store>) -> ObjectType {
    ObjectType::new("Mutation")
        .field(
            FieldDefinition::new("createItem", TypeRef::named("Item"), {
                let store = store.clone();
                move |ctx: &Ctx<'_>| {
                    with_arg(ctx, "item", |input: ItemInput| {
                        from_store(&store, |store| async move { store.create_item(input).await })
                    })
                }
            })
            .argument(InputValue::new("item", TypeRef::named_nn("ItemInput"))),
        )
        .field(
            FieldDefinition::new("createCustomer", TypeRef::named("Customer"), {
                let store = store.clone();
                move |ctx: &Ctx<'_>| {
                    with_arg(ctx, "customer", |input: CustomerInput| {
                        from_store(&store, |store| async move {
                            store.create_customer(input).await
                        })
                    })
                }
            })
            .argument(InputValue::new("customer", TypeRef::named_nn("CustomerInput"))),
        )
        .field(
            FieldDefinition::new("createOrder", TypeRef::named("Order"), {
                let store = store.clone();
                move |ctx: &Ctx<'_>| {
                    with_arg(ctx, "order", |input: OrderInput| {
                        from_store(&store, |store| async move { store.create_order(input).await })
                    })
                }
            })
            .argument(InputValue::new("order", TypeRef::named_nn("OrderInput"))),
        )
        .field(
            FieldDefinition::new("addOrderItem", TypeRef::named("OrderItem"), {
                let store = store.clone();
                move |ctx: &Ctx<'_>| {
                    with_arg(ctx, "orderitem", |input: OrderItemInput| {
                        from_store(&store, |store| async move {
                            store.create_order_item(input).await
                        })
                    })
                }
            })
            .argument(InputValue::new("orderitem", TypeRef::named_nn("OrderItemInput"))),
        )
}

fn item_type() -> ObjectType {
    ObjectType::new("Item")
        .field(FieldDefinition::property("barcode", TypeRef::named_nn(STRING)))
        .field(FieldDefinition::property("title", TypeRef::named(STRING)))
        .field(FieldDefinition::property("sellingPrice", TypeRef::named(FLOAT)))
}

fn customer_type(store: &Arc<dyn Store>) -> ObjectType {
    ObjectType::new("Customer")
        .field(FieldDefinition::property("customerId", TypeRef::named_nn(INT)))
        .field(FieldDefinition::property("name", TypeRef::named(STRING)))
        .field(FieldDefinition::property("billingAddress", TypeRef::named(STRING)))
        .field(FieldDefinition::new("orders", TypeRef::named_list("Order"), {
            let store = store.clone();
            move |ctx: &Ctx<'_>| {
                with_parent_field(ctx, "customerId", |id: i64| {
                    batched(ctx, &store, ORDERS_BY_CUSTOMER_ID, id, fetch_orders_by_customer)
                })
            }
        }))
}

fn order_type(store: &Arc<dyn Store>) -> ObjectType {
    ObjectType::new("Order")
        .field(FieldDefinition::property("orderId", TypeRef::named_nn(INT)))
        .field(FieldDefinition::property("tag", TypeRef::named(STRING)))
        .field(FieldDefinition::property("createdAt", TypeRef::named(STRING)))
        .field(FieldDefinition::property("customerId", TypeRef::named_nn(INT)))
        .field(FieldDefinition::new("customer", TypeRef::named("Customer"), {
            let store = store.clone();
            move |ctx: &Ctx<'_>| {
                with_parent_field(ctx, "customerId", |id: i64| {
                    batched(ctx, &store, CUSTOMERS_BY_ID, id, fetch_customers)
                })
            }
        }))
        .field(FieldDefinition::new(
            "items",
            TypeRef::named_list("OrderItem"),
            {
                let store = store.clone();
                move |ctx: &Ctx<'_>| {
                    with_parent_field(ctx, "orderId", |id: i64| {
                        batched(ctx, &store, ORDER_ITEMS_BY_ORDER_ID, id, fetch_order_items)
                    })
                }
            },
        ))
}

fn order_item_type(store: &Arc<dyn Store>) -> ObjectType {
    ObjectType::new("OrderItem")
        .field(FieldDefinition::property("id", TypeRef::named_nn(INT)))
        .field(FieldDefinition::property("quantity", TypeRef::named(INT)))
        .field(FieldDefinition::property("orderId", TypeRef::named_nn(INT)))
        .field(FieldDefinition::property("barcode", TypeRef::named_nn(STRING)))
        .field(FieldDefinition::new("item", TypeRef::named("Item"), {
            let store = store.clone();
            move |ctx: &Ctx<'_>| {
                with_parent_field(ctx, "barcode", |barcode: String| {
                    batched(ctx, &store, ITEMS_BY_BARCODE, barcode, fetch_items)
                })
            }
        }))
        .field(FieldDefinition::new("order", TypeRef::named("Order"), {
            let store = store.clone();
            move |ctx: &Ctx<'_>| {
                with_parent_field(ctx, "orderId", |id: i64| {
                    batched(ctx, &store, ORDERS_BY_ID, id, fetch_orders)
                })
            }
        }))
}

fn with_arg<T, F>(ctx: &Ctx<'_>, name: &str, resolve: F) -> Resolution
where
    T: FromConstValue,
    F: FnOnce(T) -> Resolution,
{
    match ctx.try_arg::<T>(name) {
        Ok(value) => resolve(value),
        Err(e) => Resolution::error(e),
    }
}

fn with_parent_field<T, F>(ctx: &Ctx<'_>, name: &str, resolve: F) -> Resolution
where
    T: FromConstValue,
    F: FnOnce(T) -> Resolution,
{
    match ctx.try_parent_field::<T>(name) {
        Ok(value) => resolve(value),
        Err(e) => Resolution::error(e),
    }
}

/// Runs one store call and completes the field with its result.
fn from_store<T, F, Fut>(store: &Arc<dyn Store>, call: F) -> Resolution
where
    T: ToConstValue,
    F: FnOnce(Arc<dyn Store>) -> Fut,
    Fut: Future<Output = StoreResult<T>> + Send + 'static,
{
    let future = call(store.clone());
    Resolution::deferred(async move {
        future
            .await
            .map(|value| value.to_const_value())
            .map_err(ResolveError::from)
    })
}

type Fetch<K, V> = fn(Arc<dyn Store>, Vec<K>) -> BoxFuture<'static, BatchResult<K, V>>;

/// Registers `key` with the request's loader named `loader`.
fn batched<K, V>(
    ctx: &Ctx<'_>,
    store: &Arc<dyn Store>,
    loader: &str,
    key: K,
    fetch: Fetch<K, V>,
) -> Resolution
where
    K: Hash + Eq + Clone + Debug + Send + Sync + 'static,
    V: ToConstValue + Clone + Send + Sync + 'static,
{
    let store = store.clone();
    match ctx.loader(loader, move |keys: Vec<K>| fetch(store.clone(), keys)) {
        Ok(loader) => {
            let load = loader.load(key);
            Resolution::deferred(async move { load.await.map(|value| value.to_const_value()) })
        }
        Err(e) => Resolution::error(e),
    }
}

fn fetch_customers(
    store: Arc<dyn Store>,
    ids: Vec<i64>,
) -> BoxFuture<'static, BatchResult<i64, Customer>> {
    Box::pin(async move { store.customers_by_ids(ids).await.map_err(|e| e.to_string()) })
}

fn fetch_orders(store: Arc<dyn Store>, ids: Vec<i64>) -> BoxFuture<'static, BatchResult<i64, Order>> {
    Box::pin(async move { store.orders_by_ids(ids).await.map_err(|e| e.to_string()) })
}

fn fetch_orders_by_customer(
    store: Arc<dyn Store>,
    customer_ids: Vec<i64>,
) -> BoxFuture<'static, BatchResult<i64, Vec<Order>>> {
    Box::pin(async move {
        store
            .orders_by_customer_ids(customer_ids)
            .await
            .map_err(|e| e.to_string())
    })
}

fn fetch_order_items(
    store: Arc<dyn Store>,
    order_ids: Vec<i64>,
) -> BoxFuture<'static, BatchResult<i64, Vec<OrderItem>>> {
    Box::pin(async move {
        store
            .order_items_by_order_ids(order_ids)
            .await
            .map_err(|e| e.to_string())
    })
}

fn fetch_items(
    store: Arc<dyn Store>,
    barcodes: Vec<String>,
) -> BoxFuture<'static, BatchResult<String, Item>> {
    Box::pin(async move { store.items_by_barcodes(barcodes).await.map_err(|e| e.to_string()) })
}
