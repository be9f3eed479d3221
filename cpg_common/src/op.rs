//! Operator boilerplate for transparent single-field newtypes.
//!
//! `op!(binary Money, Add, add)` expands to the obvious `impl Add for Money` that delegates to the
//! inner value. The type must be a tuple struct whose first field supports the operation.

#[macro_export]
macro_rules! op {
    (binary $t:ident, $trait:ident, $method:ident) => {
        impl std::ops::$trait for $t {
            type Output = $t;

            fn $method(self, rhs: Self) -> Self::Output {
                $t(std::ops::$trait::$method(self.0, rhs.0))
            }
        }
    };
    (inplace $t:ident, $trait:ident, $method:ident) => {
        impl std::ops::$trait for $t {
            fn $method(&mut self, rhs: Self) {
                std::ops::$trait::$method(&mut self.0, rhs.0)
            }
        }
    };
    (unary $t:ident, $trait:ident, $method:ident) => {
        impl std::ops::$trait for $t {
            type Output = $t;

            fn $method(self) -> Self::Output {
                $t(std::ops::$trait::$method(self.0))
            }
        }
    };
}
