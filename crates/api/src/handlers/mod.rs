pub mod admin_agent;
