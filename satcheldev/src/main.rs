mod application;
mod presentation {
    pub mod cli;
}

fn main() -> satchel_core::error::Result<()> {
    application::run()
}
