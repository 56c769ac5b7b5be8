pub mod app_config;
pub mod backlog_repo;
pub mod booking_repo;
pub mod customer_repo;
pub mod database;
pub mod flight_repo;
pub mod redis_repo;

pub use backlog_repo::PgReleaseBacklog;
pub use booking_repo::PgBookingRepository;
pub use customer_repo::PgCustomerRepository;
pub use database::DbClient;
pub use flight_repo::PgFlightRepository;
pub use redis_repo::{RedisClient, RedisEventPublisher};
