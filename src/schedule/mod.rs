pub(crate) mod execute;
pub(crate) mod plan;
pub(crate) mod techniques;
