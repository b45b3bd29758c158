//! HTML fixtures shaped like the catalog's pages, shared by unit tests

/// A product page with the given title, price and stock level
pub(crate) fn book_page(title: &str, price: &str, available: u32) -> String {
    let availability = if available == 0 {
        "Out of stock".to_string()
    } else {
        format!("In stock ({} available)", available)
    };
    format!(
        r#"<!DOCTYPE html>
<html><head><title>{title} | Books</title></head>
<body>
<ul class="breadcrumb">
  <li><a href="../../index.html">Home</a></li>
  <li><a href="../category/books_1/index.html">Books</a></li>
  <li><a href="../category/books/poetry_23/index.html">Poetry</a></li>
  <li class="active">{title}</li>
</ul>
<article class="product_page">
  <div class="row">
    <div class="col-sm-6">
      <div id="product_gallery" class="carousel">
        <div class="item active"><img src="../../media/cache/fe/72/cover.jpg" alt="{title}" /></div>
      </div>
    </div>
    <div class="col-sm-6 product_main">
      <h1>{title}</h1>
      <p class="price_color">£{price}</p>
      <p class="star-rating Three"><i class="icon-star"></i></p>
    </div>
  </div>
  <div id="product_description" class="sub-header"><h2>Product Description</h2></div>
  <p>A collection of humorous poems and drawings.</p>
  <table class="table table-striped">
    <tr><th>UPC</th><td>a897fe39b1053632</td></tr>
    <tr><th>Product Type</th><td>Books</td></tr>
    <tr><th>Price (excl. tax)</th><td>£{price}</td></tr>
    <tr><th>Price (incl. tax)</th><td>£{price}</td></tr>
    <tr><th>Tax</th><td>£0.00</td></tr>
    <tr><th>Availability</th><td>{availability}</td></tr>
    <tr><th>Number of reviews</th><td>0</td></tr>
  </table>
</article>
</body></html>"#,
        title = title,
        price = price,
        availability = availability,
    )
}
