//! Cache key scheme.
//!
//! Every key is `{service}:{family}...`. Filtered collection families end in
//! a `:` separated parameter so a whole family is removable by prefix.

pub mod users {
    pub const ALL: &str = "users:all";

    pub fn user(id: u64) -> String {
        format!("users:user:{}", id)
    }
}

pub mod orders {
    pub const ALL: &str = "orders:all";
    pub const BY_USER_PREFIX: &str = "orders:user:";

    pub fn order(id: u64) -> String {
        format!("orders:order:{}", id)
    }

    pub fn by_user(user_id: u64) -> String {
        format!("{}{}", BY_USER_PREFIX, user_id)
    }
}

pub mod reviews {
    pub const ALL: &str = "reviews:all";
    pub const BY_ORDER_PREFIX: &str = "reviews:order:";
    pub const BY_PRODUCT_PREFIX: &str = "reviews:byproduct:";

    pub fn review(id: u64) -> String {
        format!("reviews:review:{}", id)
    }

    /// `reviews:order:{orderId}` optionally narrowed by product.
    pub fn by_order(order_id: i64, product_id: Option<i64>) -> String {
        match product_id {
            Some(product) => format!("{}{}:product:{}", BY_ORDER_PREFIX, order_id, product),
            None => format!("{}{}", BY_ORDER_PREFIX, order_id),
        }
    }

    pub fn by_product(product_id: i64) -> String {
        format!("{}{}", BY_PRODUCT_PREFIX, product_id)
    }

    pub fn product_average(product_id: i64) -> String {
        format!("reviews:product:{}:avg", product_id)
    }
}
