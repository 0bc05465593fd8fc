pub mod google_aistudio;
