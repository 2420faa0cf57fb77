//! Keyed access to the inventory tables.
//!
//! The store has no batching logic of its own; bulk lookups are what
//! [`BatchLoader`](crate::loader::BatchLoader) fetch functions are built on.

use std::collections::{BTreeMap, HashMap};

use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::loader::BoxFuture;
use crate::model::{
    Customer, CustomerInput, Item, ItemInput, Order, OrderInput, OrderItem, OrderItemInput,
};

pub type StoreResult<T> = std::result::Result<T, StoreError>;

pub trait Store: Send + Sync + 'static {
    fn items(&self) -> BoxFuture<'_, StoreResult<Vec<Item>>>;
    fn item_by_barcode(&self, barcode: String) -> BoxFuture<'_, StoreResult<Option<Item>>>;
    fn items_by_barcodes(
        &self,
        barcodes: Vec<String>,
    ) -> BoxFuture<'_, StoreResult<HashMap<String, Item>>>;
    fn create_item(&self, input: ItemInput) -> BoxFuture<'_, StoreResult<Item>>;

    fn customers(&self) -> BoxFuture<'_, StoreResult<Vec<Customer>>>;
    fn customer_by_id(&self, id: i64) -> BoxFuture<'_, StoreResult<Option<Customer>>>;
    fn customers_by_ids(&self, ids: Vec<i64>)
        -> BoxFuture<'_, StoreResult<HashMap<i64, Customer>>>;
    fn create_customer(&self, input: CustomerInput) -> BoxFuture<'_, StoreResult<Customer>>;

    fn orders(&self) -> BoxFuture<'_, StoreResult<Vec<Order>>>;
    fn order_by_id(&self, id: i64) -> BoxFuture<'_, StoreResult<Option<Order>>>;
    fn orders_by_ids(&self, ids: Vec<i64>) -> BoxFuture<'_, StoreResult<HashMap<i64, Order>>>;
    fn orders_by_customer_ids(
        &self,
        customer_ids: Vec<i64>,
    ) -> BoxFuture<'_, StoreResult<HashMap<i64, Vec<Order>>>>;
    fn create_order(&self, input: OrderInput) -> BoxFuture<'_, StoreResult<Order>>;

    fn order_items_by_order_ids(
        &self,
        order_ids: Vec<i64>,
    ) -> BoxFuture<'_, StoreResult<HashMap<i64, Vec<OrderItem>>>>;
    fn create_order_item(&self, input: OrderItemInput) -> BoxFuture<'_, StoreResult<OrderItem>>;
}

#[derive(Debug, Default)]
struct Tables {
    items: BTreeMap<String, Item>,
    customers: BTreeMap<i64, Customer>,
    orders: BTreeMap<i64, Order>,
    order_items: BTreeMap<i64, OrderItem>,
}

impl Tables {
    fn next_id<V>(table: &BTreeMap<i64, V>) -> i64 {
        table.keys().next_back().map_or(1, |last| last + 1)
    }
}

/// In-memory [`Store`] guarded by a single reader/writer lock.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store holding the demo catalogue.
    pub fn seeded() -> Self {
        let mut tables = Tables::default();
        for (barcode, title, selling_price) in [
            ("123", "Headphone", 50.0),
            ("456", "Keyboard", 40.0),
            ("789", "Monitor", 100.0),
        ] {
            tables.items.insert(
                barcode.to_string(),
                Item {
                    barcode: barcode.to_string(),
                    title: title.to_string(),
                    selling_price,
                },
            );
        }
        Self {
            tables: RwLock::new(tables),
        }
    }
}

fn pick<K, V>(table: &BTreeMap<K, V>, keys: Vec<K>) -> HashMap<K, V>
where
    K: Ord + std::hash::Hash + Clone,
    V: Clone,
{
    keys.into_iter()
        .filter_map(|k| table.get(&k).map(|v| (k, v.clone())))
        .collect()
}

fn group_by<K, V, F>(rows: impl Iterator<Item = V>, keys: &[K], key_of: F) -> HashMap<K, Vec<V>>
where
    K: Eq + std::hash::Hash + Clone,
    F: Fn(&V) -> K,
{
    let mut grouped: HashMap<K, Vec<V>> = keys.iter().map(|k| (k.clone(), Vec::new())).collect();
    for row in rows {
        if let Some(group) = grouped.get_mut(&key_of(&row)) {
            group.push(row);
        }
    }
    grouped
}

impl Store for MemoryStore {
    fn items(&self) -> BoxFuture<'_, StoreResult<Vec<Item>>> {
        Box::pin(async move { Ok(self.tables.read().await.items.values().cloned().collect()) })
    }

    fn item_by_barcode(&self, barcode: String) -> BoxFuture<'_, StoreResult<Option<Item>>> {
        Box::pin(async move { Ok(self.tables.read().await.items.get(&barcode).cloned()) })
    }

    fn items_by_barcodes(
        &self,
        barcodes: Vec<String>,
    ) -> BoxFuture<'_, StoreResult<HashMap<String, Item>>> {
        Box::pin(async move { Ok(pick(&self.tables.read().await.items, barcodes)) })
    }

    fn create_item(&self, input: ItemInput) -> BoxFuture<'_, StoreResult<Item>> {
        Box::pin(async move {
            let mut tables = self.tables.write().await;
            if tables.items.contains_key(&input.barcode) {
                return Err(StoreError::Conflict {
                    entity: "Item",
                    key: input.barcode,
                });
            }
            let item = Item {
                barcode: input.barcode,
                title: input.title,
                selling_price: input.selling_price,
            };
            tables.items.insert(item.barcode.clone(), item.clone());
            Ok(item)
        })
    }

    fn customers(&self) -> BoxFuture<'_, StoreResult<Vec<Customer>>> {
        Box::pin(async move { Ok(self.tables.read().await.customers.values().cloned().collect()) })
    }

    fn customer_by_id(&self, id: i64) -> BoxFuture<'_, StoreResult<Option<Customer>>> {
        Box::pin(async move { Ok(self.tables.read().await.customers.get(&id).cloned()) })
    }

    fn customers_by_ids(
        &self,
        ids: Vec<i64>,
    ) -> BoxFuture<'_, StoreResult<HashMap<i64, Customer>>> {
        Box::pin(async move { Ok(pick(&self.tables.read().await.customers, ids)) })
    }

    fn create_customer(&self, input: CustomerInput) -> BoxFuture<'_, StoreResult<Customer>> {
        Box::pin(async move {
            let mut tables = self.tables.write().await;
            let customer = Customer {
                customer_id: Tables::next_id(&tables.customers),
                name: input.name,
                billing_address: input.billing_address,
            };
            tables
                .customers
                .insert(customer.customer_id, customer.clone());
            Ok(customer)
        })
    }

    fn orders(&self) -> BoxFuture<'_, StoreResult<Vec<Order>>> {
        Box::pin(async move { Ok(self.tables.read().await.orders.values().cloned().collect()) })
    }

    fn order_by_id(&self, id: i64) -> BoxFuture<'_, StoreResult<Option<Order>>> {
        Box::pin(async move { Ok(self.tables.read().await.orders.get(&id).cloned()) })
    }

    fn orders_by_ids(&self, ids: Vec<i64>) -> BoxFuture<'_, StoreResult<HashMap<i64, Order>>> {
        Box::pin(async move { Ok(pick(&self.tables.read().await.orders, ids)) })
    }

    fn orders_by_customer_ids(
        &self,
        customer_ids: Vec<i64>,
    ) -> BoxFuture<'_, StoreResult<HashMap<i64, Vec<Order>>>> {
        Box::pin(async move {
            let tables = self.tables.read().await;
            Ok(group_by(
                tables.orders.values().cloned(),
                &customer_ids,
                |o| o.customer_id,
            ))
        })
    }

    fn create_order(&self, input: OrderInput) -> BoxFuture<'_, StoreResult<Order>> {
        Box::pin(async move {
            let mut tables = self.tables.write().await;
            if !tables.customers.contains_key(&input.customer_id) {
                return Err(StoreError::ForeignKey {
                    entity: "Order",
                    target: "Customer",
                    key: input.customer_id.to_string(),
                });
            }
            let order = Order {
                order_id: Tables::next_id(&tables.orders),
                tag: input.tag,
                created_at: input.created_at,
                customer_id: input.customer_id,
            };
            tables.orders.insert(order.order_id, order.clone());
            Ok(order)
        })
    }

    fn order_items_by_order_ids(
        &self,
        order_ids: Vec<i64>,
    ) -> BoxFuture<'_, StoreResult<HashMap<i64, Vec<OrderItem>>>> {
        Box::pin(async move {
            let tables = self.tables.read().await;
            Ok(group_by(
                tables.order_items.values().cloned(),
                &order_ids,
                |i| i.order_id,
            ))
        })
    }

    fn create_order_item(&self, input: OrderItemInput) -> BoxFuture<'_, StoreResult<OrderItem>> {
        Box::pin(async move {
            let mut tables = self.tables.write().await;
            if !tables.orders.contains_key(&input.order_id) {
                return Err(StoreError::ForeignKey {
                    entity: "OrderItem",
                    target: "Order",
                    key: input.order_id.to_string(),
                });
            }
            if !tables.items.contains_key(&input.barcode) {
                return Err(StoreError::ForeignKey {
                    entity: "OrderItem",
                    target: "Item",
                    key: input.barcode,
                });
            }
            let order_item = OrderItem {
                id: Tables::next_id(&tables.order_items),
                barcode: input.barcode,
                quantity: input.quantity,
                order_id: input.order_id,
            };
            tables.order_items.insert(order_item.id, order_item.clone());
            Ok(order_item)
        })
    }
}
