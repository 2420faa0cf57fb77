//! Inventory entities and mutation inputs.
//!
//! Entities reference each other by key (`Order::customer_id`,
//! `OrderItem::order_id`, `OrderItem::barcode`) and are exposed to resolvers as
//! object values carrying those keys.

use async_graphql_value::ConstValue;

use crate::value::{field, object, FromConstValue, ToConstValue};

#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub barcode: String,
    pub title: String,
    pub selling_price: f64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Customer {
    pub customer_id: i64,
    pub name: String,
    pub billing_address: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub order_id: i64,
    pub tag: String,
    pub created_at: String,
    pub customer_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderItem {
    pub id: i64,
    pub barcode: String,
    pub quantity: i64,
    pub order_id: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ItemInput {
    pub barcode: String,
    pub title: String,
    pub selling_price: f64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerInput {
    pub name: String,
    pub billing_address: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderInput {
    pub tag: String,
    pub created_at: String,
    pub customer_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderItemInput {
    pub barcode: String,
    pub quantity: i64,
    pub order_id: i64,
}

impl ToConstValue for Item {
    fn to_const_value(&self) -> ConstValue {
        object([
            ("barcode", self.barcode.to_const_value()),
            ("title", self.title.to_const_value()),
            ("sellingPrice", self.selling_price.to_const_value()),
        ])
    }
}

impl FromConstValue for Item {
    fn from_const_value(value: &ConstValue) -> Result<Self, String> {
        Ok(Self {
            barcode: field(value, "barcode")?,
            title: field(value, "title")?,
            selling_price: field(value, "sellingPrice")?,
        })
    }
}

impl ToConstValue for Customer {
    fn to_const_value(&self) -> ConstValue {
        object([
            ("customerId", self.customer_id.to_const_value()),
            ("name", self.name.to_const_value()),
            ("billingAddress", self.billing_address.to_const_value()),
        ])
    }
}

impl FromConstValue for Customer {
    fn from_const_value(value: &ConstValue) -> Result<Self, String> {
        Ok(Self {
            customer_id: field(value, "customerId")?,
            name: field(value, "name")?,
            billing_address: field(value, "billingAddress")?,
        })
    }
}

impl ToConstValue for Order {
    fn to_const_value(&self) -> ConstValue {
        object([
            ("orderId", self.order_id.to_const_value()),
            ("tag", self.tag.to_const_value()),
            ("createdAt", self.created_at.to_const_value()),
            ("customerId", self.customer_id.to_const_value()),
        ])
    }
}

impl FromConstValue for Order {
    fn from_const_value(value: &ConstValue) -> Result<Self, String> {
        Ok(Self {
            order_id: field(value, "orderId")?,
            tag: field(value, "tag")?,
            created_at: field(value, "createdAt")?,
            customer_id: field(value, "customerId")?,
        })
    }
}

impl ToConstValue for OrderItem {
    fn to_const_value(&self) -> ConstValue {
        object([
            ("id", self.id.to_const_value()),
            ("barcode", self.barcode.to_const_value()),
            ("quantity", self.quantity.to_const_value()),
            ("orderId", self.order_id.to_const_value()),
        ])
    }
}

impl FromConstValue for OrderItem {
    fn from_const_value(value: &ConstValue) -> Result<Self, String> {
        Ok(Self {
            id: field(value, "id")?,
            barcode: field(value, "barcode")?,
            quantity: field(value, "quantity")?,
            order_id: field(value, "orderId")?,
        })
    }
}

impl FromConstValue for ItemInput {
    fn from_const_value(value: &ConstValue) -> Result<Self, String> {
        Ok(Self {
            barcode: field(value, "barcode")?,
            title: field(value, "title")?,
            selling_price: field(value, "sellingPrice")?,
        })
    }
}

impl FromConstValue for CustomerInput {
    fn from_const_value(value: &ConstValue) -> Result<Self, String> {
        Ok(Self {
            name: field(value, "name")?,
            billing_address: field(value, "billingAddress")?,
        })
    }
}

impl FromConstValue for OrderInput {
    fn from_const_value(value: &ConstValue) -> Result<Self, String> {
        Ok(Self {
            tag: field(value, "tag")?,
            created_at: field(value, "createdAt")?,
            customer_id: field(value, "customerId")?,
        })
    }
}

impl FromConstValue for OrderItemInput {
    fn from_const_value(value: &ConstValue) -> Result<Self, String> {
        Ok(Self {
            barcode: field(value, "barcode")?,
            quantity: field(value, "quantity")?,
            order_id: field(value, "orderId")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_exposes_foreign_key() {
        let order = Order {
            order_id: 3,
            tag: "XPS 13".to_string(),
            created_at: "2018-11-09T07:05:15Z".to_string(),
            customer_id: 9,
        };

        let value = order.to_const_value();
        assert_eq!(field::<i64>(&value, "customerId"), Ok(9));
        assert_eq!(Order::from_const_value(&value), Ok(order));
    }

    #[test]
    fn test_input_requires_all_fields() {
        let value = object([("name", "Ada".to_const_value())]);
        assert!(CustomerInput::from_const_value(&value).is_err());
    }
}
