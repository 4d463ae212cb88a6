use super::{config::GeneratorConfig, mnist::MnistDataset};

pub fn print_dataset_info(dataset: &MnistDataset, config: &GeneratorConfig) {
    let train_size = dataset.train.len();
    let test_size = dataset.test.len();
    let total_size = train_size + test_size;

    println!("Dataset Information:");
    println!("-------------------");
    println!("Total size: {}", total_size);
    println!("Batch size: {}", config.batch_size);
    println!();
    println!("Train split:");
    println!("  Size: {} ({:.2}%)", train_size, percent(train_size, total_size));
    println!("  Digits: {:?}", dataset.train.label_histogram());
    println!();
    println!("Test split:");
    println!("  Size: {} ({:.2}%)", test_size, percent(test_size, total_size));
    println!("  Digits: {:?}", dataset.test.label_histogram());
    println!();
    println!("Sampling: uniform with replacement, color red/green with p=0.5");
    println!("Prefetch: {}", config.prefetch_count);
    println!("Seed: {:?}", config.seed);
}

fn percent(part: usize, total: usize) -> f32 {
    if total == 0 {
        0.0
    } else {
        part as f32 / total as f32 * 100.0
    }
}
