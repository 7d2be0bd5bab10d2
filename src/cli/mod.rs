pub mod country_migrate;
