pub mod cpu;
mod handlers;
pub mod irq;
pub mod registers;
pub mod sm83;
pub mod timer;
