//! Supported games

mod black_mesa;
mod hl2;
mod watching_paint_dry;

pub use black_mesa::BlackMesa;
pub use hl2::HalfLife2;
pub use watching_paint_dry::WatchingPaintDry;
