pub mod supabase;

pub use supabase::{SupabaseClient, SupabaseError, SupabaseResult};
