use serde::{Deserialize, Serialize};

macro_rules! define_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i32);

        impl $name {
            /// Creates an identifier from a raw value.
            pub fn new(id: i32) -> Self {
                Self(id)
            }

            /// Returns the underlying value.
            pub fn as_i32(&self) -> i32 {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i32> for $name {
            fn from(id: i32) -> Self {
                Self(id)
            }
        }

        impl From<$name> for i32 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_id! {
    /// Unique identifier for an order, assigned by the checkout
    /// orchestrator's monotonic counter.
    OrderId
}

define_id! {
    /// Unique identifier for a shopping cart.
    CartId
}

define_id! {
    /// Unique identifier for a customer.
    CustomerId
}

define_id! {
    /// Unique identifier for a product.
    ProductId
}
