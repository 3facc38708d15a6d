pub(crate) mod linear;
pub(crate) mod shared;
