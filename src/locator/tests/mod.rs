pub mod static_page;
