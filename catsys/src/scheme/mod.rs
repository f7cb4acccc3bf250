pub mod kifint;
